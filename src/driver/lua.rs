//! Lua script drivers.
//!
//! A script defines a global `Driver` table with a `new(track, number)`
//! constructor. The instance it returns must have a `drive(cars)` method
//! and a `preferred_color()` method:
//!
//! ```lua
//! Driver = {}
//! Driver.__index = Driver
//!
//! function Driver.new(track, number)
//!     return setmetatable({ track = track, number = number }, Driver)
//! end
//!
//! function Driver:drive(cars)
//!     local me = cars[self.number + 1]
//!     return { x = me.position.x + me.velocity.x, y = me.position.y + me.velocity.y }
//! end
//!
//! function Driver:preferred_color()
//!     return "blue"
//! end
//! ```
//!
//! `cars` is a Lua sequence, so car `n` sits at index `n + 1`.

use std::fs;
use std::path::Path;

use mlua::{Function, Lua, RegistryKey, Table, UserData, UserDataFields, UserDataMethods};

use crate::driver::{CarData, Driver};
use crate::error::{DriverError, SetupError};
use crate::point::Point;
use crate::track::TrackMap;

/// The driver's private track copy as seen from Lua.
struct LuaTrack(TrackMap);

impl UserData for LuaTrack {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("width", |_, this| Ok(this.0.width()));
        fields.add_field_method_get("height", |_, this| Ok(this.0.height()));
        fields.add_field_method_get("max_distance", |_, this| Ok(this.0.max_distance()));
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("neighbors", |_, _, p: Point| {
            Ok(TrackMap::neighbors(p).to_vec())
        });
        methods.add_method("get", |_, this, p: Point| {
            Ok(this.0.cell_at(p).map(|cell| cell.as_char().to_string()))
        });
        methods.add_method("distance", |_, this, p: Point| Ok(this.0.distance_at(p)));
        methods.add_method("start_points", |_, this, (): ()| {
            Ok(this.0.start_points().to_vec())
        });
        methods.add_method("finish_points", |_, this, (): ()| {
            Ok(this.0.finish_points().to_vec())
        });
    }
}

pub(crate) fn script_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned())
}

fn missing(driver: &str, capability: &'static str) -> SetupError {
    SetupError::MissingCapability {
        driver: driver.to_string(),
        capability,
    }
}

/// A driver backed by its own Lua state.
pub struct LuaDriver {
    lua: Lua,
    instance: RegistryKey,
}

impl LuaDriver {
    pub fn load(path: &Path, track: TrackMap, number: usize) -> Result<Self, SetupError> {
        if !path.is_file() {
            return Err(SetupError::DriverNotFound {
                path: path.to_path_buf(),
            });
        }
        let name = script_name(path);
        let script = fs::read_to_string(path).map_err(|err| SetupError::DriverLoad {
            driver: name.clone(),
            source: mlua::Error::external(err),
        })?;
        Self::from_source(&name, &script, track, number)
    }

    /// Runs `script` in a fresh Lua state and constructs its driver.
    pub fn from_source(
        name: &str,
        script: &str,
        track: TrackMap,
        number: usize,
    ) -> Result<Self, SetupError> {
        let lua = Lua::new();
        lua.load(script)
            .exec()
            .map_err(|source| SetupError::DriverLoad {
                driver: name.to_string(),
                source,
            })?;

        let instance = {
            let class: Table = lua
                .globals()
                .get("Driver")
                .map_err(|_| missing(name, "a global table named \"Driver\""))?;
            let new: Function = class
                .get("new")
                .map_err(|_| missing(name, "a constructor \"Driver.new(track, number)\""))?;
            let instance: Table =
                new.call((LuaTrack(track), number))
                    .map_err(|err| SetupError::Construction {
                        driver: name.to_string(),
                        reason: err.to_string(),
                    })?;
            let _: Function = instance
                .get("drive")
                .map_err(|_| missing(name, "a \"drive\" method"))?;
            lua.create_registry_value(instance)
                .map_err(|source| SetupError::DriverLoad {
                    driver: name.to_string(),
                    source,
                })?
        };

        Ok(Self { lua, instance })
    }

    fn method<'lua>(&'lua self, name: &str) -> Result<(Table<'lua>, Function<'lua>), DriverError> {
        let instance: Table = self.lua.registry_value(&self.instance)?;
        let method: Function = instance.get(name)?;
        Ok((instance, method))
    }
}

impl Driver for LuaDriver {
    fn drive(&mut self, cars: &[CarData]) -> Result<Point, DriverError> {
        let (instance, drive) = self.method("drive")?;
        Ok(drive.call((instance, cars.to_vec()))?)
    }

    fn preferred_color(&mut self) -> Result<String, DriverError> {
        let (instance, preferred_color) = self.method("preferred_color")?;
        Ok(preferred_color.call(instance)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: &str = r#"
        Driver = {}
        Driver.__index = Driver

        function Driver.new(track, number)
            return setmetatable({ track = track, number = number }, Driver)
        end

        function Driver:drive(cars)
            local me = cars[self.number + 1]
            return { x = me.position.x + me.velocity.x, y = me.position.y + me.velocity.y }
        end

        function Driver:preferred_color()
            return "blue"
        end
    "#;

    fn track() -> TrackMap {
        "ooooooo\nos   fo\nooooooo".parse().unwrap()
    }

    fn car(x: i32, y: i32, vx: i32, vy: i32) -> CarData {
        CarData {
            position: Point::new(x, y),
            velocity: Point::new(vx, vy),
        }
    }

    #[test]
    fn drives_from_script() {
        let mut driver = LuaDriver::from_source("hold", HOLD, track(), 1).unwrap();
        assert_eq!(driver.preferred_color().unwrap(), "blue");
        let cars = [car(1, 1, 0, 0), car(2, 1, 1, 0)];
        assert_eq!(driver.drive(&cars).unwrap(), Point::new(3, 1));
    }

    #[test]
    fn exposes_track_queries() {
        let script = r#"
            Driver = {}
            function Driver.new(track, number)
                local best = nil
                for _, p in ipairs(track:neighbors({ x = 4, y = 1 })) do
                    local d = track:distance(p)
                    if track:get(p) ~= "o" and d ~= nil and (best == nil or d < track:distance(best)) then
                        best = p
                    end
                end
                return {
                    target = best,
                    size = track.width * track.height,
                    starts = #track:start_points(),
                    outside = track:get({ x = -1, y = 0 }),
                    drive = function(self, cars) return self.target end,
                    preferred_color = function(self) return tostring(self.size) end,
                }
            end
        "#;
        let mut driver = LuaDriver::from_source("scan", script, track(), 0).unwrap();
        assert_eq!(driver.drive(&[car(1, 1, 0, 0)]).unwrap(), Point::new(5, 1));
        assert_eq!(driver.preferred_color().unwrap(), "21");
    }

    #[test]
    fn script_errors_are_load_failures() {
        let err = LuaDriver::from_source("broken", "Driver = {", track(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::DriverLoad { .. }));
    }

    #[test]
    fn missing_parts_are_reported() {
        let err = LuaDriver::from_source("empty", "x = 1", track(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::MissingCapability { .. }));

        let err = LuaDriver::from_source("no_new", "Driver = {}", track(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::MissingCapability { .. }));

        let script = "Driver = { new = function(track, number) return {} end }";
        let err = LuaDriver::from_source("no_drive", script, track(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::MissingCapability { .. }));
    }

    #[test]
    fn bad_constructor_is_a_construction_error() {
        let script = "Driver = { new = function(track, number) return 42 end }";
        let err = LuaDriver::from_source("number", script, track(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Construction { .. }));

        let script = "Driver = { new = function(track, number) error('no') end }";
        let err = LuaDriver::from_source("raises", script, track(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Construction { .. }));
    }

    #[test]
    fn runtime_errors_surface_as_driver_errors() {
        let script = r#"
            Driver = {}
            function Driver.new(track, number)
                return {
                    drive = function(self, cars) error("lost the plot") end,
                    preferred_color = function(self) return "green" end,
                }
            end
        "#;
        let mut driver = LuaDriver::from_source("faulty", script, track(), 0).unwrap();
        let err = driver.drive(&[car(1, 1, 0, 0)]).unwrap_err();
        assert!(matches!(err, DriverError::Lua(_)));
        assert!(err.to_string().contains("lost the plot"));
    }

    #[test]
    fn drivers_cannot_touch_the_callers_map() {
        let original = track();
        let script = r#"
            Driver = {}
            function Driver.new(track, number)
                track.width = 0
                return { drive = function() return { 0, 0 } end }
            end
        "#;
        // userdata fields are read-only, so the write fails the constructor
        let err = LuaDriver::from_source("vandal", script, original.clone(), 0)
            .err()
            .unwrap();
        assert!(matches!(err, SetupError::Construction { .. }));
        assert_eq!(original.width(), 7);
    }
}
