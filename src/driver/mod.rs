//! The driver plugin contract and the registry that resolves plugins.
//!
//! A driver receives a private copy of the track and its car number when it
//! is built, then gets asked for a target point once per round. Drivers are
//! either Lua scripts or native Rust types registered under a name.

use std::collections::HashMap;
use std::path::Path;

use mlua::{Error as LuaError, IntoLua, Lua, Value};
use serde::{Deserialize, Serialize};

use crate::error::{DriverError, SetupError};
use crate::point::Point;
use crate::track::TrackMap;

mod builtin;
mod lua;

pub use builtin::{CruiseDriver, SimpleDriver};
pub use lua::LuaDriver;

/// Prefix selecting a registered native driver, e.g. `builtin:simple`.
pub const BUILTIN_PREFIX: &str = "builtin:";

/// One car's entry in the world state handed to drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarData {
    pub position: Point,
    pub velocity: Point,
}

impl<'lua> IntoLua<'lua> for CarData {
    fn into_lua(self, lua: &'lua Lua) -> Result<Value<'lua>, LuaError> {
        let table = lua.create_table()?;
        table.set("position", self.position)?;
        table.set("velocity", self.velocity)?;
        Ok(Value::Table(table))
    }
}

/// A racing strategy.
///
/// `cars` is indexed by car number. Cars that already moved this round show
/// their new state.
pub trait Driver: Send {
    fn drive(&mut self, cars: &[CarData]) -> Result<Point, DriverError>;

    fn preferred_color(&mut self) -> Result<String, DriverError>;
}

/// Builds a native driver from the driver's own track copy and car number.
pub type DriverFactory =
    Box<dyn Fn(TrackMap, usize) -> Result<Box<dyn Driver>, SetupError> + Send + Sync>;

/// A constructed driver together with the name it races under.
pub struct DriverPlugin {
    pub name: String,
    pub driver: Box<dyn Driver>,
}

/// Resolves driver references to driver instances.
///
/// `builtin:<name>` picks a registered factory, a path ending in `.lua`
/// loads a script.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// A registry without any native drivers. Lua scripts still resolve.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(TrackMap, usize) -> Result<Box<dyn Driver>, SetupError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn builtin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builds the driver for car `number`. The driver gets its own clone of
    /// `track`.
    pub fn load(
        &self,
        reference: &str,
        track: &TrackMap,
        number: usize,
    ) -> Result<DriverPlugin, SetupError> {
        if let Some(name) = reference.strip_prefix(BUILTIN_PREFIX) {
            let factory =
                self.factories
                    .get(name)
                    .ok_or_else(|| SetupError::UnsupportedDriver {
                        reference: reference.to_string(),
                    })?;
            let driver = factory(track.clone(), number)?;
            return Ok(DriverPlugin {
                name: name.to_string(),
                driver,
            });
        }

        let path = Path::new(reference);
        if path.extension().and_then(|ext| ext.to_str()) == Some("lua") {
            let driver = LuaDriver::load(path, track.clone(), number)?;
            return Ok(DriverPlugin {
                name: lua::script_name(path),
                driver: Box::new(driver),
            });
        }

        Err(SetupError::UnsupportedDriver {
            reference: reference.to_string(),
        })
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("simple", |track, number| {
            Ok(Box::new(SimpleDriver::new(track, number)) as Box<dyn Driver>)
        });
        registry.register("cruise", |_track, number| {
            Ok(Box::new(CruiseDriver::new(number)) as Box<dyn Driver>)
        });
        registry
    }
}
