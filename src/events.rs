//! Race events published by the scheduler.
//!
//! Everything a renderer or a log consumer gets to see goes through
//! [`RaceEvent`]. Events serialize as JSON objects tagged by `event`.

use std::fmt;

use log::Level;
use serde::{Deserialize, Serialize};

use crate::car::Car;
use crate::config::RaceConfig;
use crate::point::Point;
use crate::race::Standing;
use crate::track::TrackMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarStatus {
    Racing,
    Finished,
    Disqualified,
}

/// Point-in-time view of one car, taken between moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarFrame {
    pub number: usize,
    pub driver: String,
    pub color: String,
    pub position: Point,
    pub velocity: Point,
    pub status: CarStatus,
    pub moves: u32,
    pub driver_time_secs: f64,
}

impl CarFrame {
    pub fn new(car: &Car, track: &TrackMap, config: &RaceConfig) -> Self {
        let status = if track.distance_at(car.position) == Some(0) {
            CarStatus::Finished
        } else if !config.within_budget(car.total_time) {
            CarStatus::Disqualified
        } else {
            CarStatus::Racing
        };
        Self {
            number: car.number,
            driver: car.driver_name().to_string(),
            color: car.color.clone(),
            position: car.position,
            velocity: car.velocity,
            status,
            moves: car.total_moves,
            driver_time_secs: car.total_time.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RaceEvent {
    Started {
        cars: usize,
        max_rounds: u32,
    },
    Moved {
        round: u32,
        frame: CarFrame,
    },
    DriverFault {
        car: usize,
        driver: String,
        message: String,
    },
    IllegalMove {
        car: usize,
        driver: String,
        target: Point,
        projection: Point,
    },
    WallCrash {
        car: usize,
        driver: String,
        at: Point,
    },
    StuckInWall {
        car: usize,
        driver: String,
        at: Point,
    },
    CarCollision {
        car: usize,
        driver: String,
        at: Point,
    },
    Disqualified {
        car: usize,
        driver: String,
        driver_time_secs: f64,
    },
    Paused {
        round: u32,
    },
    Resumed {
        round: u32,
    },
    RoundFinished {
        round: u32,
    },
    Finished {
        rounds: u32,
        standings: Vec<Standing>,
    },
}

impl RaceEvent {
    /// Log level the event is reported at.
    pub fn level(&self) -> Level {
        match self {
            Self::DriverFault { .. } | Self::IllegalMove { .. } | Self::Disqualified { .. } => {
                Level::Warn
            }
            Self::Moved { .. } => Level::Debug,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for RaceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { cars, max_rounds } => {
                write!(f, "starting race with {cars} cars, max rounds: {max_rounds}")
            }
            Self::Moved { frame, .. } => write!(
                f,
                "<{}> in {} car #{} at {} with {}, time spent: {:.3}s",
                frame.driver,
                frame.color,
                frame.number,
                frame.position,
                frame.velocity,
                frame.driver_time_secs
            ),
            Self::DriverFault {
                car,
                driver,
                message,
            } => write!(
                f,
                "car #{car} with driver <{driver}> failed while driving ({message}), \
                 keeping speed and direction"
            ),
            Self::IllegalMove {
                car,
                driver,
                target,
                projection,
            } => write!(
                f,
                "car #{car} with driver <{driver}> tries to cheat: {target} is out of reach \
                 of {projection}, keeping speed and direction"
            ),
            Self::WallCrash { car, driver, at } => {
                write!(f, "car #{car} with driver <{driver}> crashed at {at}")
            }
            Self::StuckInWall { car, driver, at } => write!(
                f,
                "car #{car} with driver <{driver}> tries to bite itself through the wall at {at}"
            ),
            Self::CarCollision { car, driver, at } => write!(
                f,
                "car #{car} with driver <{driver}> crashed into another car at {at}"
            ),
            Self::Disqualified {
                car,
                driver,
                driver_time_secs,
            } => write!(
                f,
                "<{driver}> car #{car} disqualified for too much time ({driver_time_secs:.3}s)"
            ),
            Self::Paused { round } => write!(f, "race paused in round {round}"),
            Self::Resumed { round } => write!(f, "race resumed in round {round}"),
            Self::RoundFinished { round } => write!(f, "finished round {round}"),
            Self::Finished { rounds, standings } => write!(
                f,
                "race finished after {rounds} rounds, {} cars ranked",
                standings.len()
            ),
        }
    }
}
