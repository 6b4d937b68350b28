//! Host surface by name: read-only properties and methods over JSON values.
//!
//! Property names and diagnostic field names are the ones a scripting host
//! sees (`apiVersion`, `stackEntries`, ...).

#![forbid(unsafe_code)]

use crate::bridge::Asar;
use crate::engine::Engine;
use crate::error::{BridgeError, Result};
use serde::Serialize;
use serde_json::Value;

/// Properties readable through `Asar::property`.
pub const PROPERTIES: &[&str] = &[
    "version",
    "apiVersion",
    "maxRomSize",
    "errors",
    "warnings",
    "prints",
    "labels",
    "defines",
];

/// Methods callable through `Asar::call`.
pub const METHODS: &[&str] = &["reset", "patch"];

fn to_value<T: Serialize>(records: T) -> Value {
    // Records are plain strings and integers; serialization cannot fail.
    serde_json::to_value(records).unwrap_or(Value::Null)
}

impl<E: Engine> Asar<E> {
    /// Read a property by its host name.
    pub fn property(&self, name: &str) -> Result<Value> {
        let value = match name {
            "version" => Value::from(self.version()),
            "apiVersion" => Value::from(self.api_version()),
            "maxRomSize" => Value::from(self.max_rom_size()),
            "errors" => to_value(self.errors()),
            "warnings" => to_value(self.warnings()),
            "prints" => to_value(self.prints()),
            "labels" => to_value(self.labels()),
            "defines" => to_value(self.defines()),
            other => return Err(BridgeError::UnknownProperty(other.to_string())),
        };
        Ok(value)
    }

    /// Call a method by its host name.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match name {
            "reset" => Ok(Value::Bool(self.reset())),
            "patch" => {
                let request = args.first().ok_or(BridgeError::MissingArgument {
                    method: "patch",
                    index: 0,
                })?;
                self.patch(request).map(Value::Bool)
            }
            other => Err(BridgeError::UnknownMethod(other.to_string())),
        }
    }
}
