//! The engine handle: decode, build, invoke, release, translate.
//!
//! The engine keeps process-wide state (current diagnostics, file cache), so
//! every call through any `Asar` handle takes one process-wide lock. A patch
//! holds it for its whole duration; there is no cancellation.

use crate::diagnostics::{
    translate_defines, translate_diagnostics, translate_labels, translate_prints, Define,
    Diagnostic, Label,
};
use crate::engine::Engine;
use crate::error::Result;
use crate::invariant_ppt::{assert_invariant, OUTPUT_WITHIN_CAPACITY};
use crate::params::NativePatchParams;
use crate::request::PatchRequest;
use lazy_static::lazy_static;
use serde_json::Value;
use std::ffi::c_int;
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard, PoisonError};

lazy_static! {
    static ref ENGINE_LOCK: Mutex<()> = Mutex::new(());
}

pub(crate) fn engine_lock() -> MutexGuard<'static, ()> {
    // The lock guards no data, so a panic elsewhere leaves nothing inconsistent.
    ENGINE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of a patch that surfaces the produced ROM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    /// Engine success flag; on `false`, query `errors`.
    pub succeeded: bool,
    /// Produced ROM bytes, truncated to the reported length. Empty on failure.
    pub rom: Vec<u8>,
}

/// Perform the single blocking engine call for a built block.
///
/// Holds the engine lock for the whole call.
pub fn invoke<E: Engine + ?Sized>(engine: &E, params: &mut NativePatchParams) -> bool {
    let raw = params.raw();
    let _guard = engine_lock();
    // Safety: `raw` borrows from `params`, which outlives this call and is
    // not touched until it returns.
    unsafe { engine.patch(&raw) }
}

/// Borrow of an engine that holds the engine lock.
pub struct EngineGuard<'a, E: Engine + ?Sized> {
    _lock: MutexGuard<'static, ()>,
    engine: &'a E,
}

impl<E: Engine + ?Sized> Deref for EngineGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

/// Explicit handle to the patch engine.
pub struct Asar<E: Engine> {
    engine: E,
}

impl<E: Engine> Asar<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// The engine, borrowed under the engine lock until the guard drops.
    pub fn engine(&self) -> EngineGuard<'_, E> {
        EngineGuard {
            _lock: engine_lock(),
            engine: &self.engine,
        }
    }

    pub fn version(&self) -> i32 {
        let _guard = engine_lock();
        self.engine.version()
    }

    pub fn api_version(&self) -> i32 {
        let _guard = engine_lock();
        self.engine.api_version()
    }

    pub fn max_rom_size(&self) -> i32 {
        let _guard = engine_lock();
        self.engine.max_rom_size()
    }

    /// Clear diagnostics, prints and the engine's file cache.
    pub fn reset(&self) -> bool {
        let _guard = engine_lock();
        self.engine.reset()
    }

    /// Host-surface patch: decode `request`, run it, report success.
    ///
    /// Decode and allocation problems are errors; an engine-reported failure
    /// is `Ok(false)`.
    pub fn patch(&self, request: &Value) -> Result<bool> {
        let request = PatchRequest::decode(request)?;
        Ok(self.run(&request, false)?.succeeded)
    }

    /// Like `patch`, but keeps the produced ROM bytes.
    pub fn patch_rom(&self, request: &Value) -> Result<PatchOutcome> {
        let request = PatchRequest::decode(request)?;
        self.run(&request, true)
    }

    /// Patch from an already decoded request.
    pub fn patch_request(&self, request: &PatchRequest) -> Result<PatchOutcome> {
        self.run(request, true)
    }

    fn run(&self, request: &PatchRequest, keep_output: bool) -> Result<PatchOutcome> {
        let mut params = NativePatchParams::build(request)?;
        log::debug!(
            "patching {} (rom capacity {} bytes)",
            request.assembly_path,
            params.rom().capacity()
        );

        let succeeded = invoke(&self.engine, &mut params);

        let rom = if succeeded && keep_output {
            params.take_output()
        } else {
            Vec::new()
        };
        assert_invariant(
            OUTPUT_WITHIN_CAPACITY,
            rom.len() <= request.rom_size_hint,
            "produced ROM must fit the buffer",
            Some(&request.assembly_path),
        );
        log::debug!(
            "patch of {} {} ({} bytes kept)",
            request.assembly_path,
            if succeeded { "succeeded" } else { "failed" },
            rom.len()
        );
        Ok(PatchOutcome { succeeded, rom })
    }

    /// Current engine errors, copied out.
    pub fn errors(&self) -> Vec<Diagnostic> {
        let _guard = engine_lock();
        let mut count: c_int = 0;
        let list = self.engine.errors(&mut count);
        log::debug!("engine reports {} errors", count);
        // Safety: `Engine` guarantees the list until the next engine call,
        // which the lock rules out.
        unsafe { translate_diagnostics(list, count) }
    }

    /// Current engine warnings, copied out.
    pub fn warnings(&self) -> Vec<Diagnostic> {
        let _guard = engine_lock();
        let mut count: c_int = 0;
        let list = self.engine.warnings(&mut count);
        log::debug!("engine reports {} warnings", count);
        unsafe { translate_diagnostics(list, count) }
    }

    /// Text printed by the last patch.
    pub fn prints(&self) -> Vec<String> {
        let _guard = engine_lock();
        let mut count: c_int = 0;
        let list = self.engine.prints(&mut count);
        unsafe { translate_prints(list, count) }
    }

    pub fn labels(&self) -> Vec<Label> {
        let _guard = engine_lock();
        let mut count: c_int = 0;
        let list = self.engine.labels(&mut count);
        unsafe { translate_labels(list, count) }
    }

    pub fn defines(&self) -> Vec<Define> {
        let _guard = engine_lock();
        let mut count: c_int = 0;
        let list = self.engine.defines(&mut count);
        unsafe { translate_defines(list, count) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::harness::{ScriptedDiagnostic, ScriptedEngine};
    use serde_json::json;
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn decode_failure_never_reaches_engine() {
        let asar = Asar::new(ScriptedEngine::new());
        let err = asar.patch(&json!({ "defines": {} })).unwrap_err();
        assert!(matches!(err, BridgeError::MissingOrInvalidField("assemblyPath")));
        assert_eq!(asar.engine().patch_calls(), 0);
    }

    #[test]
    fn interior_nul_never_reaches_engine() {
        let asar = Asar::new(ScriptedEngine::new());
        let err = asar
            .patch(&json!({ "assemblyPath": "main.asm", "includePaths": ["a\u{0}b"] }))
            .unwrap_err();
        assert!(matches!(err, BridgeError::InteriorNul { field: "includePaths" }));
        assert_eq!(asar.engine().patch_calls(), 0);
    }

    #[test]
    fn failure_is_not_an_error() {
        let engine = ScriptedEngine::new().failing_with(vec![ScriptedDiagnostic::new(
            "main.asm",
            4,
            "lda.q #$00",
            "Eunknown_command",
        )]);
        let asar = Asar::new(engine);
        let outcome = asar.patch_rom(&json!({ "assemblyPath": "main.asm" })).unwrap();
        assert!(!outcome.succeeded);
        assert!(outcome.rom.is_empty());
        assert_eq!(asar.errors().len(), 1);
    }

    #[test]
    fn success_surfaces_produced_bytes() {
        let asar = Asar::new(ScriptedEngine::new().with_output(vec![0xea, 0xea, 0x60]));
        let outcome = asar
            .patch_rom(&json!({ "assemblyPath": "main.asm", "romSizeHint": 64 }))
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.rom, vec![0xea, 0xea, 0x60]);
    }

    fn blocked_while_locked(call: impl FnOnce() + Send + 'static) {
        let guard = engine_lock();
        let (done, finished) = mpsc::channel();
        let worker = thread::spawn(move || {
            call();
            let _ = done.send(());
        });
        assert_eq!(
            finished.recv_timeout(Duration::from_millis(100)),
            Err(RecvTimeoutError::Timeout),
            "engine reached while another caller held the lock"
        );
        drop(guard);
        finished.recv().unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn invoke_waits_for_the_engine_lock() {
        blocked_while_locked(|| {
            let engine = ScriptedEngine::new();
            let mut params = NativePatchParams::build(&PatchRequest::new("main.asm")).unwrap();
            assert!(invoke(&engine, &mut params));
            assert_eq!(engine.patch_calls(), 1);
        });
    }

    #[test]
    fn engine_access_waits_for_the_engine_lock() {
        blocked_while_locked(|| {
            let asar = Asar::new(ScriptedEngine::new());
            assert!(asar.engine().reset());
        });
    }
}
