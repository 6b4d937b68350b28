//! PPT Invariant System: invariant enforcement with contract tracking.
//!
//! Bridge code asserts its ownership and layout invariants through
//! `assert_invariant`; with the `ppt` feature each asserted id is recorded so
//! contract tests can check the invariant was actually enforced.

#[cfg(feature = "ppt")]
use lazy_static::lazy_static;
#[cfg(feature = "ppt")]
use std::collections::HashSet;
#[cfg(feature = "ppt")]
use std::sync::{Mutex, MutexGuard, PoisonError};

// Invariant ids for contract tracking.
pub const REQUEST_DECODED: u32 = 1;
pub const ROM_CAPACITY_MATCHES: u32 = 2;
pub const INCLUDE_COUNT_MATCHES: u32 = 3;
pub const DEFINE_COUNT_MATCHES: u32 = 4;
pub const WARNING_COUNT_MATCHES: u32 = 5;
pub const MEMORY_FILE_COUNT_MATCHES: u32 = 6;
pub const PARAMS_RELEASED: u32 = 7;
pub const OUTPUT_WITHIN_CAPACITY: u32 = 8;
pub const DIAGNOSTIC_FRAMES_COPIED: u32 = 9;

#[cfg(feature = "ppt")]
lazy_static! {
    static ref INVARIANT_LOG: Mutex<HashSet<u32>> = Mutex::new(HashSet::new());
}

#[cfg(feature = "ppt")]
fn invariant_log() -> MutexGuard<'static, HashSet<u32>> {
    INVARIANT_LOG.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(feature = "ppt")]
/// Assert an invariant: logs it and panics on failure.
pub(crate) fn assert_invariant(id: u32, condition: bool, message: &str, context: Option<&str>) {
    if !condition {
        let full_message = if let Some(ctx) = context {
            format!("Invariant {} failed: {} (context: {})", id, message, ctx)
        } else {
            format!("Invariant {} failed: {}", id, message)
        };
        log::error!("{}", full_message);
        panic!("{}", full_message);
    }
    invariant_log().insert(id);
}

#[cfg(not(feature = "ppt"))]
/// Assert an invariant: checks condition and panics on failure.
pub(crate) fn assert_invariant(_id: u32, condition: bool, message: &str, _context: Option<&str>) {
    if !condition {
        panic!("Invariant failed: {}", message);
    }
}

#[cfg(feature = "ppt")]
/// Contract test: checks that specified invariants were asserted.
pub fn contract_test(test_name: &str, required_invariants: &[u32]) {
    let missing: Vec<u32> = {
        let log = invariant_log();
        required_invariants
            .iter()
            .copied()
            .filter(|inv| !log.contains(inv))
            .collect()
    };
    if !missing.is_empty() {
        panic!(
            "Contract test '{}' failed: invariants not enforced: {:?}",
            test_name, missing
        );
    }
}

#[cfg(not(feature = "ppt"))]
/// Contract test: no-op when PPT feature is disabled.
pub fn contract_test(_test_name: &str, _required_invariants: &[u32]) {}

#[cfg(feature = "ppt")]
/// Clear invariant log (for between test runs).
pub fn clear_invariant_log() {
    invariant_log().clear();
}

#[cfg(not(feature = "ppt"))]
/// Clear invariant log: no-op when PPT feature is disabled.
pub fn clear_invariant_log() {}
