//! Translation of engine-owned result lists into owned host records.
//!
//! Engine lists are valid only until the next engine call, so every string
//! and stack frame is copied out before the translator returns. Null strings
//! become empty strings.

use crate::invariant_ppt::{assert_invariant, DIAGNOSTIC_FRAMES_COPIED};
use crate::raw::{RawDefineData, RawErrorData, RawLabelData, RawStackEntry};
use serde::Serialize;
use std::ffi::{c_char, c_int, CStr};

/// One frame of a diagnostic's call stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub full_path: String,
    pub pretty_path: String,
    pub line_number: i32,
    pub details: String,
}

/// One error or warning reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub full_error: String,
    pub raw_error: String,
    pub block: String,
    pub filename: String,
    pub line: i32,
    pub stack_entries: Vec<StackFrame>,
    pub error_name: String,
}

/// A label and its SNES address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    pub name: String,
    pub location: i32,
}

/// A define as the engine resolved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Define {
    pub name: String,
    pub value: String,
}

/// # Safety
///
/// `ptr` is null or points to a NUL-terminated string.
pub(crate) unsafe fn copy_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// # Safety
///
/// `ptr` is null or points to at least `count` valid `T`s.
pub(crate) unsafe fn foreign_slice<'a, T>(ptr: *const T, count: c_int) -> &'a [T] {
    match usize::try_from(count) {
        Ok(len) if len > 0 && !ptr.is_null() => std::slice::from_raw_parts(ptr, len),
        _ => &[],
    }
}

unsafe fn translate_frame(entry: &RawStackEntry) -> StackFrame {
    StackFrame {
        full_path: copy_string(entry.fullpath),
        pretty_path: copy_string(entry.prettypath),
        line_number: entry.lineno,
        details: copy_string(entry.details),
    }
}

unsafe fn translate_one(raw: &RawErrorData) -> Diagnostic {
    let frames = foreign_slice(raw.callstack, raw.callstacksize);
    let stack_entries: Vec<StackFrame> = frames.iter().map(|f| translate_frame(f)).collect();
    assert_invariant(
        DIAGNOSTIC_FRAMES_COPIED,
        stack_entries.len() == raw.callstacksize.max(0) as usize || raw.callstack.is_null(),
        "every reported stack frame must be copied",
        None,
    );
    Diagnostic {
        full_error: copy_string(raw.fullerrdata),
        raw_error: copy_string(raw.rawerrdata),
        block: copy_string(raw.block),
        filename: copy_string(raw.filename),
        line: raw.line,
        stack_entries,
        error_name: copy_string(raw.errname),
    }
}

/// Copy an engine diagnostic list, preserving engine order.
///
/// # Safety
///
/// `ptr` is null or points to `count` valid records whose strings and stack
/// arrays are valid.
pub unsafe fn translate_diagnostics(ptr: *const RawErrorData, count: c_int) -> Vec<Diagnostic> {
    foreign_slice(ptr, count)
        .iter()
        .map(|raw| translate_one(raw))
        .collect()
}

/// # Safety
///
/// `ptr` is null or points to `count` valid string pointers.
pub unsafe fn translate_prints(ptr: *const *const c_char, count: c_int) -> Vec<String> {
    foreign_slice(ptr, count)
        .iter()
        .map(|&line| copy_string(line))
        .collect()
}

/// # Safety
///
/// `ptr` is null or points to `count` valid label records.
pub unsafe fn translate_labels(ptr: *const RawLabelData, count: c_int) -> Vec<Label> {
    foreign_slice(ptr, count)
        .iter()
        .map(|label| Label {
            name: copy_string(label.name),
            location: label.location,
        })
        .collect()
}

/// # Safety
///
/// `ptr` is null or points to `count` valid define records.
pub unsafe fn translate_defines(ptr: *const RawDefineData, count: c_int) -> Vec<Define> {
    foreign_slice(ptr, count)
        .iter()
        .map(|define| Define {
            name: copy_string(define.name),
            value: copy_string(define.contents),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn empty_list_translates_to_nothing() {
        let out = unsafe { translate_diagnostics(ptr::null(), 0) };
        assert!(out.is_empty());
        let out = unsafe { translate_diagnostics(ptr::null(), 5) };
        assert!(out.is_empty());
    }

    #[test]
    fn frames_and_fields_are_copied() {
        let full = CString::new("main.asm:3: error: (Elabel_not_found): Label 'x' wasn't found.").unwrap();
        let raw_text = CString::new("Label 'x' wasn't found.").unwrap();
        let block = CString::new("jsr x").unwrap();
        let file = CString::new("main.asm").unwrap();
        let name = CString::new("Elabel_not_found").unwrap();
        let frame_path = CString::new("/src/main.asm").unwrap();
        let frame_pretty = CString::new("main.asm").unwrap();
        let frames = [
            RawStackEntry {
                fullpath: frame_path.as_ptr(),
                prettypath: frame_pretty.as_ptr(),
                lineno: 3,
                details: ptr::null(),
            },
            RawStackEntry {
                fullpath: frame_path.as_ptr(),
                prettypath: frame_pretty.as_ptr(),
                lineno: 9,
                details: block.as_ptr(),
            },
        ];
        let errors = [RawErrorData {
            fullerrdata: full.as_ptr(),
            rawerrdata: raw_text.as_ptr(),
            block: block.as_ptr(),
            filename: file.as_ptr(),
            line: 3,
            callstack: frames.as_ptr(),
            callstacksize: 2,
            errname: name.as_ptr(),
        }];

        let out = unsafe { translate_diagnostics(errors.as_ptr(), 1) };
        assert_eq!(out.len(), 1);
        let diag = &out[0];
        assert_eq!(diag.raw_error, "Label 'x' wasn't found.");
        assert_eq!(diag.block, "jsr x");
        assert_eq!(diag.filename, "main.asm");
        assert_eq!(diag.line, 3);
        assert_eq!(diag.error_name, "Elabel_not_found");
        assert_eq!(diag.stack_entries.len(), 2);
        assert_eq!(diag.stack_entries[0].details, "");
        assert_eq!(diag.stack_entries[1].line_number, 9);
        assert_eq!(diag.stack_entries[1].details, "jsr x");
    }

    #[test]
    fn diagnostic_serializes_with_host_names() {
        let diag = Diagnostic {
            full_error: "f".into(),
            raw_error: "r".into(),
            block: "b".into(),
            filename: "main.asm".into(),
            line: 1,
            stack_entries: vec![StackFrame {
                full_path: "/a".into(),
                pretty_path: "a".into(),
                line_number: 2,
                details: String::new(),
            }],
            error_name: "Eerr".into(),
        };
        let value = serde_json::to_value(&diag).unwrap();
        assert_eq!(value["fullError"], "f");
        assert_eq!(value["rawError"], "r");
        assert_eq!(value["errorName"], "Eerr");
        assert_eq!(value["stackEntries"][0]["prettyPath"], "a");
        assert_eq!(value["stackEntries"][0]["lineNumber"], 2);
        assert_eq!(value["stackEntries"][0]["fullPath"], "/a");
    }
}
