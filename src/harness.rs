//! Scripted engine: an in-process stand-in for the engine library.
//!
//! It honors the foreign contract from the engine's side: `patch` reads
//! every pointer and count in the block (so a marshalling bug shows up as
//! wrong recorded values or a crash), and the lists it hands back are owned
//! arrays that stay valid until the next `patch` or `reset`.

use crate::diagnostics::{copy_string, foreign_slice};
use crate::engine::Engine;
use crate::raw::{
    RawDefineData, RawErrorData, RawLabelData, RawPatchParams, RawStackEntry, PATCH_PARAMS_SIZE,
};
use std::cell::RefCell;
use std::ffi::{c_char, c_int, CString};
use std::ptr;

fn c_string(value: &str) -> CString {
    CString::new(value.replace('\0', "")).unwrap_or_default()
}

/// One call-stack frame the scripted engine will report.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedFrame {
    pub full_path: String,
    pub pretty_path: String,
    pub line_number: i32,
    pub details: String,
}

/// One diagnostic the scripted engine will report.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedDiagnostic {
    pub full_error: String,
    pub raw_error: String,
    pub block: String,
    pub filename: String,
    pub line: i32,
    pub error_name: String,
    pub stack: Vec<ScriptedFrame>,
}

impl ScriptedDiagnostic {
    /// Error at `filename:line` on source text `block`, formatted the way
    /// the engine formats its texts.
    pub fn new(filename: &str, line: i32, block: &str, error_name: &str) -> Self {
        let raw_error = format!("Unknown command. [{}]", block);
        Self {
            full_error: format!("{}:{}: error: ({}): {}", filename, line, error_name, raw_error),
            raw_error,
            block: block.to_string(),
            filename: filename.to_string(),
            line,
            error_name: error_name.to_string(),
            stack: vec![ScriptedFrame {
                full_path: format!("/project/{}", filename),
                pretty_path: filename.to_string(),
                line_number: line,
                details: String::new(),
            }],
        }
    }

    /// Append a frame below the existing ones.
    pub fn with_frame(mut self, pretty_path: &str, line_number: i32, details: &str) -> Self {
        self.stack.push(ScriptedFrame {
            full_path: format!("/project/{}", pretty_path),
            pretty_path: pretty_path.to_string(),
            line_number,
            details: details.to_string(),
        });
        self
    }
}

/// Everything the engine read from one parameter block.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchCall {
    pub structsize: i32,
    pub assembly_path: String,
    pub buflen: i32,
    pub romlen_in: i32,
    pub include_paths: Vec<String>,
    pub includes_null: bool,
    pub defines: Vec<(String, String)>,
    pub defines_null: bool,
    pub std_includes: Option<String>,
    pub std_defines: Option<String>,
    pub warning_settings: Vec<(String, bool)>,
    pub memory_files: Vec<(String, Vec<u8>)>,
    pub checksum_override: Option<bool>,
    pub full_call_stack: bool,
}

impl PatchCall {
    /// # Safety
    ///
    /// `params` must satisfy the `Engine::patch` contract.
    unsafe fn read(params: &RawPatchParams) -> Self {
        let optional = |p: *const c_char| (!p.is_null()).then(|| copy_string(p));
        Self {
            structsize: params.structsize,
            assembly_path: copy_string(params.patchloc),
            buflen: params.buflen,
            romlen_in: if params.romlen.is_null() { -1 } else { *params.romlen },
            include_paths: foreign_slice(params.includepaths, params.numincludepaths)
                .iter()
                .map(|&p| copy_string(p))
                .collect(),
            includes_null: params.includepaths.is_null(),
            defines: foreign_slice(params.additional_defines, params.additional_define_count)
                .iter()
                .map(|d| (copy_string(d.name), copy_string(d.contents)))
                .collect(),
            defines_null: params.additional_defines.is_null(),
            std_includes: optional(params.stdincludesfile),
            std_defines: optional(params.stddefinesfile),
            warning_settings: foreign_slice(params.warning_settings, params.warning_setting_count)
                .iter()
                .map(|w| (copy_string(w.warnid), w.enabled))
                .collect(),
            memory_files: foreign_slice(params.memory_files, params.memory_file_count)
                .iter()
                .map(|f| {
                    let data = if f.buffer.is_null() {
                        Vec::new()
                    } else {
                        std::slice::from_raw_parts(f.buffer as *const u8, f.length).to_vec()
                    };
                    (copy_string(f.path), data)
                })
                .collect(),
            checksum_override: params
                .override_checksum_gen
                .then_some(params.generate_checksum),
            full_call_stack: params.full_call_stack,
        }
    }
}

#[derive(Default)]
struct DiagnosticList {
    _strings: Vec<CString>,
    _frames: Vec<Vec<RawStackEntry>>,
    records: Vec<RawErrorData>,
}

impl DiagnosticList {
    fn new(diagnostics: &[ScriptedDiagnostic]) -> Self {
        let mut strings = Vec::new();
        let mut intern = |value: &str| {
            let owned = c_string(value);
            let p = owned.as_ptr();
            strings.push(owned);
            p
        };
        let mut frames = Vec::with_capacity(diagnostics.len());
        let mut records = Vec::with_capacity(diagnostics.len());
        for diag in diagnostics {
            let stack: Vec<RawStackEntry> = diag
                .stack
                .iter()
                .map(|frame| RawStackEntry {
                    fullpath: intern(&frame.full_path),
                    prettypath: intern(&frame.pretty_path),
                    lineno: frame.line_number,
                    details: intern(&frame.details),
                })
                .collect();
            records.push(RawErrorData {
                fullerrdata: intern(&diag.full_error),
                rawerrdata: intern(&diag.raw_error),
                block: intern(&diag.block),
                filename: intern(&diag.filename),
                line: diag.line,
                callstack: if stack.is_empty() { ptr::null() } else { stack.as_ptr() },
                callstacksize: stack.len() as c_int,
                errname: intern(&diag.error_name),
            });
            frames.push(stack);
        }
        Self {
            _strings: strings,
            _frames: frames,
            records,
        }
    }
}

#[derive(Default)]
struct StringList {
    _strings: Vec<CString>,
    pointers: Vec<*const c_char>,
}

impl StringList {
    fn new(lines: &[String]) -> Self {
        let strings: Vec<CString> = lines.iter().map(|l| c_string(l)).collect();
        let pointers = strings.iter().map(|s| s.as_ptr()).collect();
        Self {
            _strings: strings,
            pointers,
        }
    }
}

#[derive(Default)]
struct LabelList {
    _names: StringList,
    records: Vec<RawLabelData>,
}

#[derive(Default)]
struct DefineList {
    _strings: Vec<CString>,
    records: Vec<RawDefineData>,
}

impl DefineList {
    fn new(defines: &[(String, String)]) -> Self {
        let strings: Vec<CString> = defines
            .iter()
            .flat_map(|(name, value)| [c_string(name), c_string(value)])
            .collect();
        let records = strings
            .chunks(2)
            .map(|pair| RawDefineData {
                name: pair[0].as_ptr(),
                contents: pair[1].as_ptr(),
            })
            .collect();
        Self {
            _strings: strings,
            records,
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<PatchCall>,
    resets: usize,
    errors: DiagnosticList,
    warnings: DiagnosticList,
    prints: StringList,
    labels: LabelList,
    defines: DefineList,
}

impl State {
    fn clear_results(&mut self) {
        self.errors = DiagnosticList::default();
        self.warnings = DiagnosticList::default();
        self.prints = StringList::default();
        self.labels = LabelList::default();
        self.defines = DefineList::default();
    }
}

/// Engine double with scripted results.
pub struct ScriptedEngine {
    version: c_int,
    api_version: c_int,
    max_rom_size: c_int,
    output: Vec<u8>,
    failure: Vec<ScriptedDiagnostic>,
    warnings: Vec<ScriptedDiagnostic>,
    prints: Vec<String>,
    labels: Vec<(String, i32)>,
    state: RefCell<State>,
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedEngine {
    /// Engine reporting version 1.9.1, API 3.3, 16 MiB maximum, whose patches
    /// succeed and produce nothing.
    pub fn new() -> Self {
        Self {
            version: 10901,
            api_version: 303,
            max_rom_size: 16 * 1024 * 1024,
            output: Vec::new(),
            failure: Vec::new(),
            warnings: Vec::new(),
            prints: Vec::new(),
            labels: Vec::new(),
            state: RefCell::new(State::default()),
        }
    }

    pub fn with_version(mut self, version: c_int, api_version: c_int) -> Self {
        self.version = version;
        self.api_version = api_version;
        self
    }

    /// Bytes a successful patch writes into the ROM buffer.
    pub fn with_output(mut self, output: Vec<u8>) -> Self {
        self.output = output;
        self
    }

    /// Every patch fails with these errors.
    pub fn failing_with(mut self, errors: Vec<ScriptedDiagnostic>) -> Self {
        self.failure = errors;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<ScriptedDiagnostic>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_prints(mut self, prints: Vec<String>) -> Self {
        self.prints = prints;
        self
    }

    pub fn with_labels(mut self, labels: Vec<(String, i32)>) -> Self {
        self.labels = labels;
        self
    }

    pub fn patch_calls(&self) -> usize {
        self.state.borrow().calls.len()
    }

    pub fn last_call(&self) -> Option<PatchCall> {
        self.state.borrow().calls.last().cloned()
    }

    pub fn resets(&self) -> usize {
        self.state.borrow().resets
    }

    fn fail(state: &mut State, errors: &[ScriptedDiagnostic]) -> bool {
        state.errors = DiagnosticList::new(errors);
        false
    }
}

// Safety: every list pointer points into `state`, which is only replaced by
// `patch` and `reset`.
unsafe impl Engine for ScriptedEngine {
    fn version(&self) -> c_int {
        self.version
    }

    fn api_version(&self) -> c_int {
        self.api_version
    }

    fn reset(&self) -> bool {
        let mut state = self.state.borrow_mut();
        state.clear_results();
        state.resets += 1;
        true
    }

    fn max_rom_size(&self) -> c_int {
        self.max_rom_size
    }

    unsafe fn patch(&self, params: &RawPatchParams) -> bool {
        let call = PatchCall::read(params);
        let mut state = self.state.borrow_mut();
        state.clear_results();
        let assembly_path = call.assembly_path.clone();
        let defines = call.defines.clone();
        let structsize = call.structsize;
        state.calls.push(call);

        if structsize != PATCH_PARAMS_SIZE {
            return Self::fail(
                &mut state,
                &[ScriptedDiagnostic::new(&assembly_path, 0, "", "Einvalid_params")],
            );
        }
        if !self.failure.is_empty() {
            return Self::fail(&mut state, &self.failure);
        }
        let capacity = usize::try_from(params.buflen).unwrap_or(0);
        if self.output.len() > capacity || params.romdata.is_null() || params.romlen.is_null() {
            return Self::fail(
                &mut state,
                &[ScriptedDiagnostic::new(&assembly_path, 0, "", "Ebuffer_too_small")],
            );
        }

        ptr::copy_nonoverlapping(
            self.output.as_ptr(),
            params.romdata as *mut u8,
            self.output.len(),
        );
        *params.romlen = self.output.len() as c_int;

        state.warnings = DiagnosticList::new(&self.warnings);
        state.prints = StringList::new(&self.prints);
        let names: Vec<String> = self.labels.iter().map(|(name, _)| name.clone()).collect();
        let names = StringList::new(&names);
        let records = names
            .pointers
            .iter()
            .zip(&self.labels)
            .map(|(&name, &(_, location))| RawLabelData { name, location })
            .collect();
        state.labels = LabelList {
            _names: names,
            records,
        };
        state.defines = DefineList::new(&defines);
        true
    }

    fn errors(&self, count: &mut c_int) -> *const RawErrorData {
        let state = self.state.borrow();
        *count = state.errors.records.len() as c_int;
        state.errors.records.as_ptr()
    }

    fn warnings(&self, count: &mut c_int) -> *const RawErrorData {
        let state = self.state.borrow();
        *count = state.warnings.records.len() as c_int;
        state.warnings.records.as_ptr()
    }

    fn prints(&self, count: &mut c_int) -> *const *const c_char {
        let state = self.state.borrow();
        *count = state.prints.pointers.len() as c_int;
        state.prints.pointers.as_ptr()
    }

    fn labels(&self, count: &mut c_int) -> *const RawLabelData {
        let state = self.state.borrow();
        *count = state.labels.records.len() as c_int;
        state.labels.records.as_ptr()
    }

    fn defines(&self, count: &mut c_int) -> *const RawDefineData {
        let state = self.state.borrow();
        *count = state.defines.records.len() as c_int;
        state.defines.records.as_ptr()
    }
}
