//! Request decoding: loosely-typed host configuration into a typed `PatchRequest`.
//!
//! Only `assemblyPath` is mandatory. Every optional field is type-checked on
//! its own; a present value of the wrong type is treated as absent rather than
//! rejected.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use crate::error::{BridgeError, Result};
use crate::invariant_ppt::{assert_invariant, REQUEST_DECODED};
use serde_json::{Map, Value};

/// Output buffer size used when `romSizeHint` is absent or unusable.
pub const DEFAULT_ROM_SIZE: usize = 1_048_576;

/// A decoded patch request. One per `patch` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    /// Entry assembly file; the engine resolves `incsrc` relative to it.
    pub assembly_path: String,
    /// Capacity of the output ROM buffer in bytes.
    pub rom_size_hint: usize,
    /// Extra include search paths, in order.
    pub include_paths: Option<Vec<String>>,
    /// Additional defines as (name, contents), in mapping order.
    pub defines: Option<Vec<(String, String)>>,
    /// File listing standard include search paths.
    pub std_includes_path: Option<String>,
    /// File listing standard defines.
    pub std_defines_path: Option<String>,
    /// Checksum override; `None` leaves the engine default.
    pub generate_checksum: Option<bool>,
    /// Always include the full call stack in diagnostic texts.
    pub full_call_stack: bool,
    /// Warning ids ("Wxxxx") to enable or disable.
    pub warning_settings: Option<Vec<(String, bool)>>,
    /// Files placed on the engine's virtual filesystem, as (path, contents).
    pub memory_files: Option<Vec<(String, String)>>,
}

impl PatchRequest {
    /// Request with only the assembly path set and every default applied.
    pub fn new(assembly_path: impl Into<String>) -> Self {
        Self {
            assembly_path: assembly_path.into(),
            rom_size_hint: DEFAULT_ROM_SIZE,
            include_paths: None,
            defines: None,
            std_includes_path: None,
            std_defines_path: None,
            generate_checksum: None,
            full_call_stack: false,
            warning_settings: None,
            memory_files: None,
        }
    }

    /// Decode a host configuration object.
    ///
    /// Fails only when `assemblyPath` is missing or not a string, or when the
    /// value is not an object at all.
    pub fn decode(value: &Value) -> Result<Self> {
        let fields = value
            .as_object()
            .ok_or(BridgeError::MissingOrInvalidField("assemblyPath"))?;
        let assembly_path = fields
            .get("assemblyPath")
            .and_then(Value::as_str)
            .ok_or(BridgeError::MissingOrInvalidField("assemblyPath"))?;

        let request = Self {
            assembly_path: assembly_path.to_string(),
            rom_size_hint: fields
                .get("romSizeHint")
                .and_then(decode_size)
                .unwrap_or(DEFAULT_ROM_SIZE),
            include_paths: fields.get("includePaths").and_then(decode_string_list),
            defines: fields.get("defines").and_then(decode_string_map),
            std_includes_path: optional_string(fields, "stdIncludesPath"),
            std_defines_path: optional_string(fields, "stdDefinesPath"),
            generate_checksum: fields.get("generateChecksum").and_then(Value::as_bool),
            full_call_stack: fields
                .get("fullCallStack")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            warning_settings: fields.get("warningSettings").and_then(decode_bool_map),
            memory_files: fields.get("memoryFiles").and_then(decode_string_map),
        };

        assert_invariant(
            REQUEST_DECODED,
            request.rom_size_hint <= i32::MAX as usize,
            "ROM capacity must fit the engine's int length",
            None,
        );
        Ok(request)
    }
}

fn optional_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Non-negative finite numbers, truncated; anything that cannot be a foreign
/// `int` byte count falls back to the default.
fn decode_size(value: &Value) -> Option<usize> {
    let size = match value.as_u64() {
        Some(n) => n,
        None => {
            let f = value.as_f64()?;
            if !f.is_finite() || f < 0.0 {
                return None;
            }
            f.trunc() as u64
        }
    };
    if size > i32::MAX as u64 {
        return None;
    }
    usize::try_from(size).ok()
}

fn decode_string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
        .filter(|items| !items.is_empty())
}

fn decode_string_map(value: &Value) -> Option<Vec<(String, String)>> {
    value
        .as_object()?
        .iter()
        .map(|(key, item)| item.as_str().map(|s| (key.clone(), s.to_string())))
        .collect::<Option<Vec<_>>>()
        .filter(|entries| !entries.is_empty())
}

fn decode_bool_map(value: &Value) -> Option<Vec<(String, bool)>> {
    value
        .as_object()?
        .iter()
        .map(|(key, item)| item.as_bool().map(|b| (key.clone(), b)))
        .collect::<Option<Vec<_>>>()
        .filter(|entries| !entries.is_empty())
}
