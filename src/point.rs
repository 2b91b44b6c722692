use std::fmt;
use std::ops::{Add, Sub};

use mlua::{Error as LuaError, FromLua, IntoLua, Lua, Value};
use serde::{Deserialize, Serialize};

/// Integer grid coordinate, also used as a displacement (velocity).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev length, i.e. the number of unit steps needed to cover this
    /// displacement on an 8-connected grid.
    pub fn chebyshev(self) -> i32 {
        self.x.abs().max(self.y.abs())
    }
}

impl Add for Point {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl<'lua> IntoLua<'lua> for Point {
    fn into_lua(self, lua: &'lua Lua) -> Result<Value<'lua>, LuaError> {
        let table = lua.create_table()?;
        table.set("x", self.x)?;
        table.set("y", self.y)?;
        Ok(Value::Table(table))
    }
}

// Accepts both `{ x = 1, y = 2 }` and `{ 1, 2 }`.
impl<'lua> FromLua<'lua> for Point {
    fn from_lua(value: Value<'lua>, _lua: &'lua Lua) -> Result<Self, LuaError> {
        match value {
            Value::Table(table) => {
                let x: Option<i32> = table.get("x")?;
                match x {
                    Some(x) => Ok(Self::new(x, table.get("y")?)),
                    None => Ok(Self::new(table.get(1)?, table.get(2)?)),
                }
            }
            other => Err(LuaError::FromLuaConversionError {
                from: other.type_name(),
                to: "Point",
                message: Some("expected a point table".to_string()),
            }),
        }
    }
}
