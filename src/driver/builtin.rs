use crate::driver::{CarData, Driver};
use crate::error::DriverError;
use crate::point::Point;
use crate::track::{Cell, TrackMap};

fn own_entry(cars: &[CarData], number: usize) -> Result<CarData, DriverError> {
    cars.get(number).copied().ok_or_else(|| DriverError::Failed {
        reason: format!("world state has no entry for car #{number}"),
    })
}

/// Greedy driver: heads for the reachable neighbor of its projection with
/// the lowest distance to the finish.
pub struct SimpleDriver {
    track: TrackMap,
    number: usize,
}

impl SimpleDriver {
    pub const fn new(track: TrackMap, number: usize) -> Self {
        Self { track, number }
    }
}

impl Driver for SimpleDriver {
    fn drive(&mut self, cars: &[CarData]) -> Result<Point, DriverError> {
        let me = own_entry(cars, self.number)?;
        let projection = me.position + me.velocity;

        // first minimum wins on ties; with nothing left we hold course and crash
        let best = TrackMap::neighbors(projection)
            .into_iter()
            .filter(|&p| !matches!(self.track.cell_at(p), None | Some(Cell::Wall)))
            .filter_map(|p| self.track.distance_at(p).map(|d| (d, p)))
            .min_by_key(|&(d, _)| d);

        Ok(best.map_or(projection, |(_, p)| p))
    }

    fn preferred_color(&mut self) -> Result<String, DriverError> {
        Ok("red".to_string())
    }
}

/// Never steers: always asks for the straight-line projection.
pub struct CruiseDriver {
    number: usize,
}

impl CruiseDriver {
    pub const fn new(number: usize) -> Self {
        Self { number }
    }
}

impl Driver for CruiseDriver {
    fn drive(&mut self, cars: &[CarData]) -> Result<Point, DriverError> {
        let me = own_entry(cars, self.number)?;
        Ok(me.position + me.velocity)
    }

    fn preferred_color(&mut self) -> Result<String, DriverError> {
        Ok("gray".to_string())
    }
}
