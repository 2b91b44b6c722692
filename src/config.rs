use std::time::Duration;

use crate::error::SetupError;

pub const DEFAULT_MAX_ROUNDS: u32 = 100;
pub const DEFAULT_MOVE_DELAY_SECS: f64 = 0.05;
pub const DEFAULT_DRIVER_TIME_SECS: f64 = 10.0;

/// Race parameters, handed over as plain values by whoever drives the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceConfig {
    /// Hard cap on rounds, cars might get stuck.
    pub max_rounds: u32,
    /// Pause after every single move.
    pub move_delay: Duration,
    /// Cumulative driver time after which a car is disqualified.
    pub driver_time_budget: Duration,
    /// Driver faults abort the race instead of being absorbed.
    pub debug: bool,
    /// Randomize the registration order of the drivers.
    pub shuffle: bool,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            move_delay: Duration::from_secs_f64(DEFAULT_MOVE_DELAY_SECS),
            driver_time_budget: Duration::from_secs_f64(DEFAULT_DRIVER_TIME_SECS),
            debug: false,
            shuffle: false,
        }
    }
}

fn seconds(name: &str, secs: f64) -> Result<Duration, SetupError> {
    Duration::try_from_secs_f64(secs).map_err(|_| SetupError::InvalidConfig {
        reason: format!("{name} must be a non-negative number of seconds, got {secs}"),
    })
}

impl RaceConfig {
    /// Builds a config from the second-based values a command line offers.
    pub fn from_secs(
        max_rounds: u32,
        move_delay_secs: f64,
        driver_time_secs: f64,
    ) -> Result<Self, SetupError> {
        let config = Self {
            max_rounds,
            move_delay: seconds("time delay", move_delay_secs)?,
            driver_time_budget: seconds("driver time", driver_time_secs)?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        if self.max_rounds == 0 {
            return Err(SetupError::InvalidConfig {
                reason: "max rounds must be positive".to_string(),
            });
        }
        if self.driver_time_budget.is_zero() {
            return Err(SetupError::InvalidConfig {
                reason: "driver time must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// True while a driver may still race with `elapsed` on its clock.
    pub fn within_budget(&self, elapsed: Duration) -> bool {
        elapsed < self.driver_time_budget
    }
}
