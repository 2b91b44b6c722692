//! Error types for track loading, driver plugins and the race scheduler.
//!
//! Setup failures are fatal and abort before a race runs. Driver call
//! failures are recoverable unless the race runs in debug mode, in which
//! case they surface as [`RaceError::DriverFault`].

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::point::Point;

/// Fatal errors raised while loading the track, the drivers or the
/// configuration.
#[derive(Debug)]
pub enum SetupError {
    /// The map file could not be opened or read.
    MapUnreadable { path: PathBuf, source: io::Error },
    /// The map has no rows at all.
    EmptyMap,
    /// A row's length differs from the first row's.
    InconsistentRow {
        /// 1-based line number.
        line: usize,
        expected: usize,
        found: usize,
        /// True when the offending row is the last one.
        last: bool,
    },
    /// A row does not start and end with a wall.
    BorderNotWall { line: usize },
    /// The first or the last row is not all wall.
    EdgeRowNotWall { line: usize },
    /// A character other than `s`, `f`, `o` or space.
    UnknownCharacter { ch: char, at: Point },
    NoStartPoints,
    NoFinishPoints,
    /// A start cell never received a distance.
    StartUnreachable { at: Point },
    /// A driver script does not exist.
    DriverNotFound { path: PathBuf },
    /// A driver script failed to load or to run its top-level chunk.
    DriverLoad { driver: String, source: mlua::Error },
    /// A driver lacks a required part of the plugin contract.
    MissingCapability {
        driver: String,
        capability: &'static str,
    },
    /// The driver's constructor failed or returned something unusable.
    Construction { driver: String, reason: String },
    /// The driver reference matches no registered plugin kind.
    UnsupportedDriver { reference: String },
    TooManyDrivers { drivers: usize, start_points: usize },
    InvalidConfig { reason: String },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MapUnreadable { path, .. } => {
                write!(f, "map file <{}> could not be read", path.display())
            }
            Self::EmptyMap => write!(f, "map file is empty"),
            Self::InconsistentRow {
                line,
                expected,
                found,
                last,
            } => {
                write!(
                    f,
                    "map lines have inconsistent length, see line #{line} \
                     (expected {expected}, found {found})"
                )?;
                if *last {
                    write!(f, "; missing line break in last line?")?;
                }
                Ok(())
            }
            Self::BorderNotWall { line } => write!(
                f,
                "first and last character of every map line must be \"o\", see line #{line}"
            ),
            Self::EdgeRowNotWall { line } => {
                write!(f, "map line #{line} must be all \"o\"")
            }
            Self::UnknownCharacter { ch, at } => {
                write!(f, "unknown character in map: {ch:?} at {at}")
            }
            Self::NoStartPoints => write!(f, "map has no start points"),
            Self::NoFinishPoints => write!(f, "map has no finish points"),
            Self::StartUnreachable { at } => {
                write!(f, "start point {at} has no path to the finish")
            }
            Self::DriverNotFound { path } => {
                write!(f, "driver file <{}> does not exist", path.display())
            }
            Self::DriverLoad { driver, .. } => write!(f, "loading driver <{driver}> failed"),
            Self::MissingCapability { driver, capability } => {
                write!(f, "driver <{driver}> does not provide {capability}")
            }
            Self::Construction { driver, reason } => {
                write!(f, "cannot create an instance of driver <{driver}>: {reason}")
            }
            Self::UnsupportedDriver { reference } => {
                write!(f, "unsupported driver reference <{reference}>")
            }
            Self::TooManyDrivers {
                drivers,
                start_points,
            } => write!(
                f,
                "too many drivers for this map: there are {drivers} drivers, \
                 but only {start_points} start points"
            ),
            Self::InvalidConfig { reason } => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl Error for SetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MapUnreadable { source, .. } => Some(source),
            Self::DriverLoad { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A single driver invocation failed.
#[derive(Debug)]
pub enum DriverError {
    /// The Lua side raised an error or returned an unconvertible value.
    Lua(mlua::Error),
    /// A native driver gave up.
    Failed { reason: String },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lua(err) => write!(f, "lua error: {err}"),
            Self::Failed { reason } => write!(f, "{reason}"),
        }
    }
}

impl Error for DriverError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lua(err) => Some(err),
            Self::Failed { .. } => None,
        }
    }
}

impl From<mlua::Error> for DriverError {
    fn from(err: mlua::Error) -> Self {
        Self::Lua(err)
    }
}

/// Errors that end a race early.
#[derive(Debug)]
pub enum RaceError {
    /// `run` was called on a race that is not ready.
    NotReady,
    /// Every control handle was dropped before the start signal.
    ControlClosed,
    /// A driver failed while fault isolation was disabled (debug mode).
    DriverFault {
        car: usize,
        driver: String,
        source: DriverError,
    },
}

impl fmt::Display for RaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "race is not ready to run"),
            Self::ControlClosed => write!(f, "race control closed before the start signal"),
            Self::DriverFault { car, driver, .. } => {
                write!(f, "car #{car} with driver <{driver}> failed while driving")
            }
        }
    }
}

impl Error for RaceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DriverFault { source, .. } => Some(source),
            _ => None,
        }
    }
}
