//! The round-based race scheduler.
//!
//! A [`Race`] owns the cars and moves them one after the other, round after
//! round, on the thread that calls [`Race::run`]. Other threads steer it
//! through a [`RaceHandle`] and watch it through the event stream.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use flume::{Receiver, Sender};
use log::{debug, info, log};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::car::{Car, MoveReport};
use crate::config::RaceConfig;
use crate::driver::{CarData, DriverRegistry};
use crate::error::{RaceError, SetupError};
use crate::events::{CarFrame, RaceEvent};
use crate::track::TrackMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RaceStatus {
    Idle = 0,
    Ready = 1,
    Running = 2,
    Paused = 3,
    Finished = 4,
}

impl RaceStatus {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Paused,
            _ => Self::Finished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Start,
    Pause,
    Resume,
}

/// Control surface for a race running on another thread.
///
/// Signals are one-way; the status is only ever written by the race.
#[derive(Debug, Clone)]
pub struct RaceHandle {
    signals: Sender<Signal>,
    status: Arc<AtomicU8>,
}

impl RaceHandle {
    /// Returns false when the race is gone.
    pub fn start(&self) -> bool {
        self.signals.send(Signal::Start).is_ok()
    }

    /// Takes effect after the move in progress.
    pub fn pause(&self) -> bool {
        self.signals.send(Signal::Pause).is_ok()
    }

    pub fn resume(&self) -> bool {
        self.signals.send(Signal::Resume).is_ok()
    }

    pub fn status(&self) -> RaceStatus {
        RaceStatus::from_u8(self.status.load(Ordering::Acquire))
    }
}

/// One line of the final ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    /// 1-based.
    pub rank: usize,
    pub car: usize,
    pub driver: String,
    pub color: String,
    /// Distance to the finish at the end, `None` if unreachable.
    pub distance: Option<u32>,
    pub moves: u32,
    pub driver_time_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceResult {
    pub rounds: u32,
    pub standings: Vec<Standing>,
}

/// Orders standings by distance, then moves, then driver time. Ties keep
/// their input order. Unreachable distances rank last.
pub fn rank(mut standings: Vec<Standing>) -> Vec<Standing> {
    standings.sort_by(|a, b| {
        let distance = |s: &Standing| s.distance.map_or(u64::MAX, u64::from);
        distance(a)
            .cmp(&distance(b))
            .then(a.moves.cmp(&b.moves))
            .then(a.driver_time_secs.total_cmp(&b.driver_time_secs))
    });
    for (i, standing) in standings.iter_mut().enumerate() {
        standing.rank = i + 1;
    }
    standings
}

pub struct Race {
    track: Arc<TrackMap>,
    cars: Vec<Car>,
    config: RaceConfig,
    status: Arc<AtomicU8>,
    control: Option<Sender<Signal>>,
    signals: Receiver<Signal>,
    subscribers: Vec<Sender<RaceEvent>>,
}

impl Race {
    /// Loads every driver and places the cars on their start points.
    ///
    /// Drivers are registered in the given order, or shuffled when the
    /// config asks for it. Car `n` starts on the `n`-th start point.
    pub fn setup<S: AsRef<str>>(
        track: TrackMap,
        drivers: &[S],
        registry: &DriverRegistry,
        config: RaceConfig,
    ) -> Result<Self, SetupError> {
        let status = Arc::new(AtomicU8::new(RaceStatus::Idle as u8));
        config.validate()?;
        if drivers.len() > track.start_points().len() {
            return Err(SetupError::TooManyDrivers {
                drivers: drivers.len(),
                start_points: track.start_points().len(),
            });
        }

        let mut references: Vec<&str> = drivers.iter().map(|d| d.as_ref()).collect();
        if config.shuffle {
            references.shuffle(&mut rand::thread_rng());
        }

        let mut cars = Vec::with_capacity(references.len());
        for (number, reference) in references.into_iter().enumerate() {
            let car = Car::new(number, reference, &track, registry)?;
            info!(
                "loaded driver <{}> as car #{} with color {}",
                reference, number, car.color
            );
            cars.push(car);
        }

        let (control, signals) = flume::unbounded();
        status.store(RaceStatus::Ready as u8, Ordering::Release);
        Ok(Self {
            track: Arc::new(track),
            cars,
            config,
            status,
            control: Some(control),
            signals,
            subscribers: Vec::new(),
        })
    }

    /// A new control handle. Handles must be created before `run`.
    pub fn handle(&self) -> RaceHandle {
        let signals = match &self.control {
            Some(control) => control.clone(),
            // the race is already running or over: hand out a dead sender
            None => flume::unbounded().0,
        };
        RaceHandle {
            signals,
            status: Arc::clone(&self.status),
        }
    }

    /// A new receiver of every event published from now on.
    pub fn subscribe(&mut self) -> Receiver<RaceEvent> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn status(&self) -> RaceStatus {
        RaceStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn track(&self) -> &TrackMap {
        &self.track
    }

    pub fn cars(&self) -> &[Car] {
        &self.cars
    }

    pub fn frames(&self) -> Vec<CarFrame> {
        self.cars
            .iter()
            .map(|car| CarFrame::new(car, &self.track, &self.config))
            .collect()
    }

    /// Waits for the start signal, races and returns the ranking.
    ///
    /// Blocks the calling thread for the whole race.
    pub fn run(&mut self) -> Result<RaceResult, RaceError> {
        if self.status() != RaceStatus::Ready {
            return Err(RaceError::NotReady);
        }
        // only handles keep the control channel open from here on
        self.control = None;
        self.wait_for_start()?;

        self.set_status(RaceStatus::Running);
        let outcome = self.race_loop();
        self.set_status(RaceStatus::Finished);

        let rounds = outcome?;
        let result = self.result(rounds);
        self.publish(RaceEvent::Finished {
            rounds,
            standings: result.standings.clone(),
        });
        Ok(result)
    }

    fn wait_for_start(&mut self) -> Result<(), RaceError> {
        loop {
            match self.signals.recv() {
                Ok(Signal::Start) => return Ok(()),
                Ok(signal) => debug!("ignoring {:?} before the start", signal),
                Err(_) => return Err(RaceError::ControlClosed),
            }
        }
    }

    fn race_loop(&mut self) -> Result<u32, RaceError> {
        self.publish(RaceEvent::Started {
            cars: self.cars.len(),
            max_rounds: self.config.max_rounds,
        });

        let mut rounds = 0;
        for round in 1..=self.config.max_rounds {
            let active = self.active_cars();
            if active.is_empty() {
                break;
            }
            rounds = round;

            for index in active {
                self.move_car(round, index)?;
                if !self.config.move_delay.is_zero() {
                    thread::sleep(self.config.move_delay);
                }
                self.poll_control(round);
            }
            self.publish(RaceEvent::RoundFinished { round });
        }
        Ok(rounds)
    }

    /// Cars still on the track: not on the finish and within their time
    /// budget. Registration order.
    fn active_cars(&self) -> Vec<usize> {
        self.cars
            .iter()
            .enumerate()
            .filter(|(_, car)| {
                matches!(self.track.distance_at(car.position), Some(d) if d > 0)
                    && self.config.within_budget(car.total_time)
            })
            .map(|(index, _)| index)
            .collect()
    }

    fn move_car(&mut self, round: u32, index: usize) -> Result<(), RaceError> {
        let world: Vec<CarData> = self.cars.iter().map(Car::data).collect();
        let isolate_faults = !self.config.debug;

        let car = &mut self.cars[index];
        let report = car
            .step(&world, &self.track, isolate_faults)
            .map_err(|source| RaceError::DriverFault {
                car: car.number,
                driver: car.driver_name().to_string(),
                source,
            })?;

        let mut events = report_events(car, &report);
        let frame = CarFrame::new(car, &self.track, &self.config);
        let over_budget = !self.config.within_budget(car.total_time);
        events.push(RaceEvent::Moved { round, frame });
        if over_budget {
            events.push(RaceEvent::Disqualified {
                car: car.number,
                driver: car.driver_name().to_string(),
                driver_time_secs: car.total_time.as_secs_f64(),
            });
        }

        for event in events {
            self.publish(event);
        }
        Ok(())
    }

    // Handles every pending signal. A pause blocks until resumed, or until
    // no handle is left to resume.
    fn poll_control(&mut self, round: u32) {
        while let Ok(signal) = self.signals.try_recv() {
            if signal != Signal::Pause {
                continue;
            }
            self.set_status(RaceStatus::Paused);
            self.publish(RaceEvent::Paused { round });
            loop {
                match self.signals.recv() {
                    Ok(Signal::Resume) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            self.set_status(RaceStatus::Running);
            self.publish(RaceEvent::Resumed { round });
        }
    }

    fn result(&self, rounds: u32) -> RaceResult {
        let standings = self
            .cars
            .iter()
            .map(|car| Standing {
                rank: 0,
                car: car.number,
                driver: car.driver_name().to_string(),
                color: car.color.clone(),
                distance: self.track.distance_at(car.position),
                moves: car.total_moves,
                driver_time_secs: car.total_time.as_secs_f64(),
            })
            .collect();
        RaceResult {
            rounds,
            standings: rank(standings),
        }
    }

    fn set_status(&self, status: RaceStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn publish(&mut self, event: RaceEvent) {
        log!(event.level(), "{}", event);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn report_events(car: &Car, report: &MoveReport) -> Vec<RaceEvent> {
    let driver = car.driver_name().to_string();
    let mut events = Vec::new();
    if let Some(message) = &report.driver_fault {
        events.push(RaceEvent::DriverFault {
            car: car.number,
            driver: driver.clone(),
            message: message.clone(),
        });
    }
    if report.illegal {
        events.push(RaceEvent::IllegalMove {
            car: car.number,
            driver: driver.clone(),
            target: report.requested,
            projection: report.projection,
        });
    }
    if let Some(at) = report.wall_crash {
        events.push(RaceEvent::WallCrash {
            car: car.number,
            driver: driver.clone(),
            at,
        });
        if report.stuck_in_wall {
            events.push(RaceEvent::StuckInWall {
                car: car.number,
                driver: driver.clone(),
                at,
            });
        }
    }
    if report.car_collision {
        events.push(RaceEvent::CarCollision {
            car: car.number,
            driver,
            at: report.position,
        });
    }
    events
}
