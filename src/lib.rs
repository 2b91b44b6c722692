//! Grid race simulator for scripted drivers.
//!
//! Drivers steer cars across a text-defined track, one move per round. The
//! engine checks every move against the track, resolves crashes, keeps time
//! on every driver and ranks the field once the race is over.

pub mod car;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod point;
pub mod race;
pub mod track;

pub use car::{resolve_move, Car, MoveReport};
pub use config::RaceConfig;
pub use driver::{CarData, Driver, DriverRegistry};
pub use error::{DriverError, RaceError, SetupError};
pub use events::{CarFrame, CarStatus, RaceEvent};
pub use point::Point;
pub use race::{rank, Race, RaceHandle, RaceResult, RaceStatus, Standing};
pub use track::{Cell, TrackMap};
