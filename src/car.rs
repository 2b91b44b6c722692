use std::any::Any;
use std::cmp::Ordering;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::driver::{CarData, Driver, DriverPlugin, DriverRegistry};
use crate::error::{DriverError, SetupError};
use crate::point::Point;
use crate::track::TrackMap;

/// What happened while resolving one move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveReport {
    pub projection: Point,
    /// The driver's answer, or the projection when the driver failed.
    pub requested: Point,
    /// Set when the driver raised a fault and the car held course.
    pub driver_fault: Option<String>,
    /// The requested target was outside the projection's neighborhood.
    pub illegal: bool,
    /// First wall cell on the path, if any.
    pub wall_crash: Option<Point>,
    /// The car was already on a wall and stayed put.
    pub stuck_in_wall: bool,
    /// Another car occupied the final cell.
    pub car_collision: bool,
    pub position: Point,
    pub velocity: Point,
}

// n / d rounded to the nearest integer, ties to even. d > 0.
fn div_round_half_even(n: i32, d: i32) -> i32 {
    let q = n.div_euclid(d);
    let r = n.rem_euclid(d);
    match (2 * r).cmp(&d) {
        Ordering::Less => q,
        Ordering::Greater => q + 1,
        Ordering::Equal if q.rem_euclid(2) == 0 => q,
        Ordering::Equal => q + 1,
    }
}

/// Resolves a requested target against the rules of the track.
///
/// Deterministic: looks at nothing but its arguments. `cars` is the world
/// snapshot the driver saw, including the moving car itself.
pub fn resolve_move(
    position: Point,
    velocity: Point,
    requested: Point,
    cars: &[CarData],
    track: &TrackMap,
) -> MoveReport {
    let projection = position + velocity;
    let illegal = !TrackMap::neighbors(projection).contains(&requested);
    let mut target = if illegal { projection } else { requested };
    let mut new_velocity = target - position;

    let mut wall_crash = None;
    let mut stuck_in_wall = false;
    let steps = new_velocity.chebyshev();
    for i in 1..=steps {
        let offset = Point::new(
            div_round_half_even(new_velocity.x * i, steps),
            div_round_half_even(new_velocity.y * i, steps),
        );
        let p = position + offset;
        if track.is_wall(p) {
            wall_crash = Some(p);
            if track.is_wall(position) {
                // a wrecked car may not dig itself through the wall
                stuck_in_wall = true;
                target = position;
            } else {
                target = p;
            }
            new_velocity = Point::ZERO;
            break;
        }
    }

    let car_collision = !track.is_wall(target) && cars.iter().any(|c| c.position == target);
    if car_collision {
        new_velocity = Point::ZERO;
    }

    MoveReport {
        projection,
        requested,
        driver_fault: None,
        illegal,
        wall_crash,
        stuck_in_wall,
        car_collision,
        position: target,
        velocity: new_velocity,
    }
}

fn panicked(payload: &(dyn Any + Send)) -> DriverError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    DriverError::Failed {
        reason: format!("driver panicked: {message}"),
    }
}

/// A competitor: its state on the track plus the driver steering it.
pub struct Car {
    pub number: usize,
    pub position: Point,
    pub velocity: Point,
    pub color: String,
    /// Wall-clock time spent inside the driver, construction included.
    pub total_time: Duration,
    pub total_moves: u32,
    driver_name: String,
    driver: Box<dyn Driver>,
}

impl Car {
    /// Builds car `number` on its start point with the driver `reference`
    /// resolves to.
    pub fn new(
        number: usize,
        reference: &str,
        track: &TrackMap,
        registry: &DriverRegistry,
    ) -> Result<Self, SetupError> {
        let start_points = track.start_points();
        let position = *start_points
            .get(number)
            .ok_or(SetupError::TooManyDrivers {
                drivers: number + 1,
                start_points: start_points.len(),
            })?;

        let t = Instant::now();
        let DriverPlugin { name, mut driver } = registry.load(reference, track, number)?;
        let color = driver
            .preferred_color()
            .map_err(|err| SetupError::Construction {
                driver: name.clone(),
                reason: format!("preferred_color failed: {err}"),
            })?;
        let total_time = t.elapsed();

        Ok(Self {
            number,
            position,
            velocity: Point::ZERO,
            color,
            total_time,
            total_moves: 0,
            driver_name: name,
            driver,
        })
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub const fn data(&self) -> CarData {
        CarData {
            position: self.position,
            velocity: self.velocity,
        }
    }

    /// Asks the driver for a move, resolves it and commits the result.
    ///
    /// A panicking driver counts as a failing one. With `isolate_faults` a
    /// failing driver holds course and the fault is recorded in the report.
    /// Without it the error is returned, the car is left where it was and
    /// the move is not counted.
    pub fn step(
        &mut self,
        cars: &[CarData],
        track: &TrackMap,
        isolate_faults: bool,
    ) -> Result<MoveReport, DriverError> {
        let projection = self.position + self.velocity;

        let t = Instant::now();
        let answer = panic::catch_unwind(AssertUnwindSafe(|| self.driver.drive(cars)))
            .unwrap_or_else(|payload| Err(panicked(payload.as_ref())));
        self.total_time += t.elapsed();

        let (requested, driver_fault) = match answer {
            Ok(target) => (target, None),
            Err(err) if isolate_faults => (projection, Some(err.to_string())),
            Err(err) => return Err(err),
        };
        self.total_moves += 1;

        let mut report = resolve_move(self.position, self.velocity, requested, cars, track);
        report.driver_fault = driver_fault;
        self.position = report.position;
        self.velocity = report.velocity;
        Ok(report)
    }
}
