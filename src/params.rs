//! Native parameter block construction and release.
//!
//! Every allocation that crosses the call boundary is owned by a guard in
//! this module. Building either returns a fully populated
//! `NativePatchParams` or drops everything built so far before the error
//! propagates; dropping the block releases each allocation exactly once.
//! Absent optional fields own nothing and produce null pointers with zero
//! counts.

use crate::error::{BridgeError, Result};
use crate::invariant_ppt::{
    assert_invariant, DEFINE_COUNT_MATCHES, INCLUDE_COUNT_MATCHES, MEMORY_FILE_COUNT_MATCHES,
    PARAMS_RELEASED, ROM_CAPACITY_MATCHES, WARNING_COUNT_MATCHES,
};
use crate::raw::{RawDefineData, RawMemoryFile, RawPatchParams, RawWarnSetting, PATCH_PARAMS_SIZE};
use crate::request::PatchRequest;
use std::ffi::{c_char, c_int, c_void, CString};
use std::ptr;

fn owned_cstring(value: &str, field: &'static str) -> Result<CString> {
    CString::new(value).map_err(|_| BridgeError::InteriorNul { field })
}

fn foreign_count(len: usize, field: &'static str) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| BridgeError::TooManyEntries { field, len })
}

/// An owned array of C strings, e.g. include paths.
#[derive(Debug)]
pub struct OwnedStrArray {
    strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl OwnedStrArray {
    /// Copy `items` in order.
    pub fn new(items: &[String], field: &'static str) -> Result<Self> {
        foreign_count(items.len(), field)?;
        let strings = items
            .iter()
            .map(|item| owned_cstring(item, field))
            .collect::<Result<Vec<_>>>()?;
        let pointers = strings.iter().map(|s| s.as_ptr()).collect();
        Ok(Self { strings, pointers })
    }

    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    pub fn as_ptr(&self) -> *const *const c_char {
        self.pointers.as_ptr()
    }

    fn lends_only_owned(&self) -> bool {
        self.strings.len() == self.pointers.len()
            && self
                .strings
                .iter()
                .zip(&self.pointers)
                .all(|(s, &p)| s.as_ptr() == p)
    }

    /// Entries as the engine will see them.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.strings.iter().map(|s| s.to_str().unwrap_or_default())
    }
}

/// Owned `(name, contents)` define entries.
#[derive(Debug)]
pub struct DefineTable {
    strings: Vec<(CString, CString)>,
    entries: Vec<RawDefineData>,
}

impl DefineTable {
    pub fn new(defines: &[(String, String)]) -> Result<Self> {
        foreign_count(defines.len(), "defines")?;
        let strings = defines
            .iter()
            .map(|(name, contents)| {
                Ok((
                    owned_cstring(name, "defines")?,
                    owned_cstring(contents, "defines")?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let entries = strings
            .iter()
            .map(|(name, contents)| RawDefineData {
                name: name.as_ptr(),
                contents: contents.as_ptr(),
            })
            .collect();
        Ok(Self { strings, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_ptr(&self) -> *const RawDefineData {
        self.entries.as_ptr()
    }

    fn lends_only_owned(&self) -> bool {
        self.strings.len() == self.entries.len()
            && self
                .strings
                .iter()
                .zip(&self.entries)
                .all(|((name, contents), e)| {
                    name.as_ptr() == e.name && contents.as_ptr() == e.contents
                })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.strings.iter().map(|(name, contents)| {
            (
                name.to_str().unwrap_or_default(),
                contents.to_str().unwrap_or_default(),
            )
        })
    }
}

/// Owned warning enable/disable entries.
#[derive(Debug)]
pub struct WarningTable {
    ids: Vec<CString>,
    entries: Vec<RawWarnSetting>,
}

impl WarningTable {
    pub fn new(settings: &[(String, bool)]) -> Result<Self> {
        foreign_count(settings.len(), "warningSettings")?;
        let ids = settings
            .iter()
            .map(|(id, _)| owned_cstring(id, "warningSettings"))
            .collect::<Result<Vec<_>>>()?;
        let entries = ids
            .iter()
            .zip(settings)
            .map(|(id, &(_, enabled))| RawWarnSetting {
                warnid: id.as_ptr(),
                enabled,
            })
            .collect();
        Ok(Self { ids, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_ptr(&self) -> *const RawWarnSetting {
        self.entries.as_ptr()
    }

    fn lends_only_owned(&self) -> bool {
        self.ids.len() == self.entries.len()
            && self
                .ids
                .iter()
                .zip(&self.entries)
                .all(|(id, e)| id.as_ptr() == e.warnid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        self.ids
            .iter()
            .zip(&self.entries)
            .map(|(id, entry)| (id.to_str().unwrap_or_default(), entry.enabled))
    }
}

/// Owned virtual files: path strings plus content buffers.
#[derive(Debug)]
pub struct MemoryFileTable {
    paths: Vec<CString>,
    contents: Vec<Box<[u8]>>,
    entries: Vec<RawMemoryFile>,
}

impl MemoryFileTable {
    pub fn new(files: &[(String, String)]) -> Result<Self> {
        foreign_count(files.len(), "memoryFiles")?;
        let paths = files
            .iter()
            .map(|(path, _)| owned_cstring(path, "memoryFiles"))
            .collect::<Result<Vec<_>>>()?;
        let contents: Vec<Box<[u8]>> = files
            .iter()
            .map(|(_, data)| Box::from(data.as_bytes()))
            .collect();
        let entries = paths
            .iter()
            .zip(&contents)
            .map(|(path, data)| RawMemoryFile {
                path: path.as_ptr(),
                buffer: data.as_ptr() as *const c_void,
                length: data.len(),
            })
            .collect();
        Ok(Self {
            paths,
            contents,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_ptr(&self) -> *const RawMemoryFile {
        self.entries.as_ptr()
    }

    fn lends_only_owned(&self) -> bool {
        self.paths.len() == self.entries.len()
            && self.contents.len() == self.entries.len()
            && self
                .paths
                .iter()
                .zip(&self.contents)
                .zip(&self.entries)
                .all(|((path, data), e)| {
                    path.as_ptr() == e.path
                        && data.as_ptr() as *const c_void == e.buffer
                        && data.len() == e.length
                })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> + '_ {
        self.paths
            .iter()
            .zip(&self.contents)
            .map(|(path, data)| (path.to_str().unwrap_or_default(), &data[..]))
    }
}

/// Fixed-capacity output area the engine writes the patched ROM into.
#[derive(Debug)]
pub struct RomBuffer {
    data: Vec<u8>,
    // Engine-written length slot. Starts at the capacity.
    produced: c_int,
}

impl RomBuffer {
    /// Reserve `capacity` zeroed bytes, reporting failure instead of aborting.
    pub fn allocate(capacity: usize) -> Result<Self> {
        let produced = c_int::try_from(capacity).map_err(|_| BridgeError::AllocationFailed {
            bytes: capacity,
        })?;
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BridgeError::AllocationFailed { bytes: capacity })?;
        data.resize(capacity, 0);
        Ok(Self { data, produced })
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Length the engine reported, clamped to the capacity.
    pub fn produced_len(&self) -> usize {
        match usize::try_from(self.produced) {
            Ok(len) if len <= self.data.len() => len,
            _ => {
                log::warn!(
                    "engine reported ROM length {} outside buffer capacity {}; clamping",
                    self.produced,
                    self.data.len()
                );
                self.data.len()
            }
        }
    }

    /// Bytes produced by the last patch.
    pub fn produced(&self) -> &[u8] {
        &self.data[..self.produced_len()]
    }

    fn take_produced(&mut self) -> Vec<u8> {
        let len = self.produced_len();
        let mut data = std::mem::take(&mut self.data);
        data.truncate(len);
        self.produced = 0;
        data
    }
}

/// Everything one `asar_patch` call borrows, owned for the call's duration.
#[derive(Debug)]
pub struct NativePatchParams {
    assembly_path: CString,
    rom: RomBuffer,
    include_paths: Option<OwnedStrArray>,
    defines: Option<DefineTable>,
    std_includes: Option<CString>,
    std_defines: Option<CString>,
    warnings: Option<WarningTable>,
    memory_files: Option<MemoryFileTable>,
    generate_checksum: Option<bool>,
    full_call_stack: bool,
}

impl NativePatchParams {
    /// Allocate and populate the block for `request`.
    pub fn build(request: &PatchRequest) -> Result<Self> {
        let assembly_path = owned_cstring(&request.assembly_path, "assemblyPath")?;
        let rom = RomBuffer::allocate(request.rom_size_hint)?;
        let include_paths = request
            .include_paths
            .as_deref()
            .filter(|paths| !paths.is_empty())
            .map(|paths| OwnedStrArray::new(paths, "includePaths"))
            .transpose()?;
        let defines = request
            .defines
            .as_deref()
            .filter(|defines| !defines.is_empty())
            .map(DefineTable::new)
            .transpose()?;
        let std_includes = request
            .std_includes_path
            .as_deref()
            .map(|path| owned_cstring(path, "stdIncludesPath"))
            .transpose()?;
        let std_defines = request
            .std_defines_path
            .as_deref()
            .map(|path| owned_cstring(path, "stdDefinesPath"))
            .transpose()?;
        let warnings = request
            .warning_settings
            .as_deref()
            .filter(|settings| !settings.is_empty())
            .map(WarningTable::new)
            .transpose()?;
        let memory_files = request
            .memory_files
            .as_deref()
            .filter(|files| !files.is_empty())
            .map(MemoryFileTable::new)
            .transpose()?;

        let params = Self {
            assembly_path,
            rom,
            include_paths,
            defines,
            std_includes,
            std_defines,
            warnings,
            memory_files,
            generate_checksum: request.generate_checksum,
            full_call_stack: request.full_call_stack,
        };
        params.check_counts(request);
        Ok(params)
    }

    fn check_counts(&self, request: &PatchRequest) {
        let len_of = |items: Option<usize>| items.unwrap_or(0);
        assert_invariant(
            ROM_CAPACITY_MATCHES,
            self.rom.capacity() == request.rom_size_hint,
            "ROM buffer capacity must equal the size hint",
            None,
        );
        assert_invariant(
            INCLUDE_COUNT_MATCHES,
            len_of(self.include_paths.as_ref().map(OwnedStrArray::len))
                == len_of(request.include_paths.as_ref().map(Vec::len)),
            "include path count must equal the request's",
            Some(&request.assembly_path),
        );
        assert_invariant(
            DEFINE_COUNT_MATCHES,
            len_of(self.defines.as_ref().map(DefineTable::len))
                == len_of(request.defines.as_ref().map(Vec::len)),
            "define count must equal the request's",
            Some(&request.assembly_path),
        );
        assert_invariant(
            WARNING_COUNT_MATCHES,
            len_of(self.warnings.as_ref().map(WarningTable::len))
                == len_of(request.warning_settings.as_ref().map(Vec::len)),
            "warning setting count must equal the request's",
            Some(&request.assembly_path),
        );
        assert_invariant(
            MEMORY_FILE_COUNT_MATCHES,
            len_of(self.memory_files.as_ref().map(MemoryFileTable::len))
                == len_of(request.memory_files.as_ref().map(Vec::len)),
            "memory file count must equal the request's",
            Some(&request.assembly_path),
        );
    }

    /// The foreign block. Its pointers borrow from `self` and stay valid
    /// until `self` is mutated or dropped.
    pub fn raw(&mut self) -> RawPatchParams {
        // Counts were range-checked when each table was built.
        let count = |len: usize| len as c_int;
        RawPatchParams {
            structsize: PATCH_PARAMS_SIZE,
            patchloc: self.assembly_path.as_ptr(),
            romdata: self.rom.data.as_mut_ptr() as *mut c_char,
            buflen: count(self.rom.capacity()),
            romlen: &mut self.rom.produced,
            includepaths: self
                .include_paths
                .as_ref()
                .map_or(ptr::null(), OwnedStrArray::as_ptr),
            numincludepaths: count(self.include_paths.as_ref().map_or(0, OwnedStrArray::len)),
            additional_defines: self
                .defines
                .as_ref()
                .map_or(ptr::null(), DefineTable::as_ptr),
            additional_define_count: count(self.defines.as_ref().map_or(0, DefineTable::len)),
            stdincludesfile: self
                .std_includes
                .as_ref()
                .map_or(ptr::null(), |s| s.as_ptr()),
            stddefinesfile: self
                .std_defines
                .as_ref()
                .map_or(ptr::null(), |s| s.as_ptr()),
            warning_settings: self
                .warnings
                .as_ref()
                .map_or(ptr::null(), WarningTable::as_ptr),
            warning_setting_count: count(self.warnings.as_ref().map_or(0, WarningTable::len)),
            memory_files: self
                .memory_files
                .as_ref()
                .map_or(ptr::null(), MemoryFileTable::as_ptr),
            memory_file_count: count(self.memory_files.as_ref().map_or(0, MemoryFileTable::len)),
            override_checksum_gen: self.generate_checksum.is_some(),
            generate_checksum: self.generate_checksum.unwrap_or(false),
            full_call_stack: self.full_call_stack,
        }
    }

    pub fn assembly_path(&self) -> &str {
        self.assembly_path.to_str().unwrap_or_default()
    }

    pub fn rom(&self) -> &RomBuffer {
        &self.rom
    }

    pub fn include_paths(&self) -> Option<&OwnedStrArray> {
        self.include_paths.as_ref()
    }

    pub fn defines(&self) -> Option<&DefineTable> {
        self.defines.as_ref()
    }

    pub fn warning_settings(&self) -> Option<&WarningTable> {
        self.warnings.as_ref()
    }

    pub fn memory_files(&self) -> Option<&MemoryFileTable> {
        self.memory_files.as_ref()
    }

    pub fn generate_checksum(&self) -> Option<bool> {
        self.generate_checksum
    }

    pub fn full_call_stack(&self) -> bool {
        self.full_call_stack
    }

    /// Every pointer `raw` hands out addresses storage this block owns, so
    /// dropping the block releases exactly what the engine was lent.
    fn lends_only_owned(&self) -> bool {
        self.include_paths
            .as_ref()
            .map_or(true, OwnedStrArray::lends_only_owned)
            && self.defines.as_ref().map_or(true, DefineTable::lends_only_owned)
            && self.warnings.as_ref().map_or(true, WarningTable::lends_only_owned)
            && self
                .memory_files
                .as_ref()
                .map_or(true, MemoryFileTable::lends_only_owned)
    }

    /// Move the produced ROM bytes out; the rest is released on drop.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.rom.take_produced()
    }
}

impl Drop for NativePatchParams {
    fn drop(&mut self) {
        log::trace!(
            "releasing parameter block for {:?}: {} include paths, {} defines, {} rom bytes",
            self.assembly_path,
            self.include_paths.as_ref().map_or(0, OwnedStrArray::len),
            self.defines.as_ref().map_or(0, DefineTable::len),
            self.rom.capacity()
        );
        assert_invariant(
            PARAMS_RELEASED,
            self.lends_only_owned(),
            "released tables must own every pointer lent to the engine",
            self.assembly_path.to_str().ok(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    fn read(ptr: *const c_char) -> String {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }

    #[test]
    fn minimal_block_has_null_optionals() {
        let mut params = NativePatchParams::build(&PatchRequest::new("main.asm")).unwrap();
        let raw = params.raw();
        assert_eq!(raw.structsize, PATCH_PARAMS_SIZE);
        assert_eq!(read(raw.patchloc), "main.asm");
        assert_eq!(raw.buflen, 1_048_576);
        assert!(raw.includepaths.is_null());
        assert_eq!(raw.numincludepaths, 0);
        assert!(raw.additional_defines.is_null());
        assert_eq!(raw.additional_define_count, 0);
        assert!(raw.stdincludesfile.is_null());
        assert!(raw.stddefinesfile.is_null());
        assert!(raw.warning_settings.is_null());
        assert!(raw.memory_files.is_null());
        assert!(!raw.override_checksum_gen);
        assert!(!raw.full_call_stack);
        assert_eq!(unsafe { *raw.romlen }, 1_048_576);
    }

    #[test]
    fn tables_point_at_owned_copies() {
        let mut request = PatchRequest::new("main.asm");
        request.include_paths = Some(vec!["lib".into(), "src".into()]);
        request.defines = Some(vec![("_VER".into(), "1".into())]);
        request.std_includes_path = Some("stdinc.txt".into());
        request.generate_checksum = Some(false);
        request.memory_files = Some(vec![("v.asm".into(), "nop".into())]);
        let mut params = NativePatchParams::build(&request).unwrap();
        let raw = params.raw();

        assert_eq!(raw.numincludepaths, 2);
        let includes = unsafe { std::slice::from_raw_parts(raw.includepaths, 2) };
        assert_eq!(read(includes[0]), "lib");
        assert_eq!(read(includes[1]), "src");

        let define = unsafe { *raw.additional_defines };
        assert_eq!(read(define.name), "_VER");
        assert_eq!(read(define.contents), "1");

        assert_eq!(read(raw.stdincludesfile), "stdinc.txt");
        assert!(raw.override_checksum_gen);
        assert!(!raw.generate_checksum);

        let file = unsafe { *raw.memory_files };
        assert_eq!(read(file.path), "v.asm");
        let bytes = unsafe { std::slice::from_raw_parts(file.buffer as *const u8, file.length) };
        assert_eq!(bytes, b"nop");
    }

    #[test]
    fn interior_nul_fails_with_field() {
        let mut request = PatchRequest::new("main.asm");
        request.defines = Some(vec![("A".into(), "1".into()), ("B\0".into(), "2".into())]);
        let err = NativePatchParams::build(&request).unwrap_err();
        assert!(matches!(err, BridgeError::InteriorNul { field: "defines" }));
    }

    #[test]
    fn counts_beyond_c_int_are_rejected() {
        let too_many = c_int::MAX as usize + 1;
        let err = foreign_count(too_many, "includePaths").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::TooManyEntries { field: "includePaths", len } if len == too_many
        ));
        assert_eq!(foreign_count(3, "defines").unwrap(), 3);
    }

    #[test]
    fn built_tables_lend_only_owned_storage() {
        let mut request = PatchRequest::new("main.asm");
        request.include_paths = Some(vec!["lib".into(), "src".into()]);
        request.defines = Some(vec![("_VER".into(), "1".into())]);
        request.warning_settings = Some(vec![("W1001".into(), true)]);
        request.memory_files = Some(vec![("v.asm".into(), "nop".into())]);
        let mut params = NativePatchParams::build(&request).unwrap();
        assert!(params.lends_only_owned());

        // A lent pointer outside the block's storage breaks the invariant.
        if let Some(includes) = params.include_paths.as_mut() {
            includes.pointers[1] = includes.pointers[0];
        }
        assert!(!params.lends_only_owned());
        params.include_paths = None;
    }

    #[test]
    fn empty_sequences_are_absent() {
        let mut request = PatchRequest::new("main.asm");
        request.include_paths = Some(vec![]);
        request.defines = Some(vec![]);
        let mut params = NativePatchParams::build(&request).unwrap();
        assert!(params.include_paths().is_none());
        assert!(params.raw().includepaths.is_null());
        assert!(params.raw().additional_defines.is_null());
    }

    #[test]
    fn output_is_truncated_to_reported_length() {
        let mut request = PatchRequest::new("main.asm");
        request.rom_size_hint = 16;
        let mut params = NativePatchParams::build(&request).unwrap();
        let raw = params.raw();
        unsafe {
            *raw.romdata = 0x4c;
            *raw.romlen = 4;
        }
        assert_eq!(params.rom().produced_len(), 4);
        let out = params.take_output();
        assert_eq!(out, vec![0x4c, 0, 0, 0]);
    }

    #[test]
    fn out_of_range_length_is_clamped() {
        let mut request = PatchRequest::new("main.asm");
        request.rom_size_hint = 8;
        let mut params = NativePatchParams::build(&request).unwrap();
        unsafe { *params.raw().romlen = 64 };
        assert_eq!(params.rom().produced_len(), 8);
        unsafe { *params.raw().romlen = -1 };
        assert_eq!(params.rom().produced().len(), 8);
    }
}
