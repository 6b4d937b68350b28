//! Foreign layouts of the engine's C interface.
//!
//! These mirror `interface-lib.h` field for field. Pointers in a
//! `RawPatchParams` borrow from a `NativePatchParams`; pointers handed back by
//! the engine are valid only until the next engine call.

use std::ffi::{c_char, c_int, c_void};

/// One additional define: `!name = contents`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDefineData {
    pub name: *const c_char,
    pub contents: *const c_char,
}

/// Enable or disable one warning by id.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawWarnSetting {
    pub warnid: *const c_char,
    pub enabled: bool,
}

/// A file on the engine's virtual filesystem.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawMemoryFile {
    pub path: *const c_char,
    pub buffer: *const c_void,
    pub length: usize,
}

/// The `patchparams` block handed to `asar_patch`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawPatchParams {
    /// Must equal `size_of::<RawPatchParams>()`.
    pub structsize: c_int,

    pub patchloc: *const c_char,
    pub romdata: *mut c_char,
    pub buflen: c_int,
    pub romlen: *mut c_int,

    pub includepaths: *const *const c_char,
    pub numincludepaths: c_int,

    pub additional_defines: *const RawDefineData,
    pub additional_define_count: c_int,

    pub stdincludesfile: *const c_char,
    pub stddefinesfile: *const c_char,

    pub warning_settings: *const RawWarnSetting,
    pub warning_setting_count: c_int,

    pub memory_files: *const RawMemoryFile,
    pub memory_file_count: c_int,

    pub override_checksum_gen: bool,
    pub generate_checksum: bool,
    pub full_call_stack: bool,
}

/// `sizeof(struct patchparams)` as the engine expects it in `structsize`.
pub const PATCH_PARAMS_SIZE: c_int = std::mem::size_of::<RawPatchParams>() as c_int;

/// One frame of a diagnostic's call stack.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStackEntry {
    pub fullpath: *const c_char,
    pub prettypath: *const c_char,
    pub lineno: c_int,
    pub details: *const c_char,
}

/// One error or warning.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawErrorData {
    pub fullerrdata: *const c_char,
    pub rawerrdata: *const c_char,
    pub block: *const c_char,
    pub filename: *const c_char,
    pub line: c_int,
    pub callstack: *const RawStackEntry,
    pub callstacksize: c_int,
    pub errname: *const c_char,
}

/// One label and its SNES address.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawLabelData {
    pub name: *const c_char,
    pub location: c_int,
}

pub type VersionFn = unsafe extern "C" fn() -> c_int;
pub type ResetFn = unsafe extern "C" fn() -> bool;
pub type PatchFn = unsafe extern "C" fn(*const RawPatchParams) -> bool;
pub type ErrorListFn = unsafe extern "C" fn(*mut c_int) -> *const RawErrorData;
pub type PrintListFn = unsafe extern "C" fn(*mut c_int) -> *const *const c_char;
pub type LabelListFn = unsafe extern "C" fn(*mut c_int) -> *const RawLabelData;
pub type DefineListFn = unsafe extern "C" fn(*mut c_int) -> *const RawDefineData;
