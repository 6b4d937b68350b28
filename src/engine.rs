//! The foreign engine contract.

use crate::raw::{RawDefineData, RawErrorData, RawLabelData, RawPatchParams};
use std::ffi::{c_char, c_int};
use std::fmt;

/// Entry points of the patch engine, in their raw foreign form.
///
/// The engine is process-wide mutable state with no concurrency contract of
/// its own; `Asar` serializes every call made through this trait.
///
/// # Safety
///
/// Implementors guarantee that every list query returns either null or a
/// pointer to `*count` valid records, and that those records (and every
/// string and stack array they point to) stay valid until the next call into
/// the engine.
pub unsafe trait Engine {
    /// `major*10000 + minor*100 + bugfix`.
    fn version(&self) -> c_int;

    /// `major*100 + minor`.
    fn api_version(&self) -> c_int;

    /// Clears diagnostics, prints and the file cache.
    fn reset(&self) -> bool;

    /// Largest ROM the engine can produce.
    fn max_rom_size(&self) -> c_int;

    /// Runs one patch. `false` means diagnostics are pending.
    ///
    /// # Safety
    ///
    /// Every pointer in `params` must stay valid until this returns, and
    /// every count must equal the length of its array.
    unsafe fn patch(&self, params: &RawPatchParams) -> bool;

    fn errors(&self, count: &mut c_int) -> *const RawErrorData;

    fn warnings(&self, count: &mut c_int) -> *const RawErrorData;

    fn prints(&self, count: &mut c_int) -> *const *const c_char;

    fn labels(&self, count: &mut c_int) -> *const RawLabelData;

    fn defines(&self, count: &mut c_int) -> *const RawDefineData;
}

/// Decoded engine release version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub bugfix: u32,
}

impl EngineVersion {
    /// Decode `major*10000 + minor*100 + bugfix`; 1.2.34 is 10234.
    pub fn from_raw(raw: c_int) -> Self {
        let raw = raw.max(0) as u32;
        Self {
            major: raw / 10_000,
            minor: raw / 100 % 100,
            bugfix: raw % 100,
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.bugfix)
    }
}

/// Decoded engine API version. Major changes are incompatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersion {
    pub major: u32,
    pub minor: u32,
}

impl ApiVersion {
    /// Decode `major*100 + minor`.
    pub fn from_raw(raw: c_int) -> Self {
        let raw = raw.max(0) as u32;
        Self {
            major: raw / 100,
            minor: raw % 100,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
