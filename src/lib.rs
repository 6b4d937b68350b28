//! Bridge between loosely-typed host requests and the Asar patch engine.
//!
//! A request flows decode → build → invoke → release; diagnostics are
//! queried separately and copied out of engine memory.
//!
//! ```ignore
//! use asar_bridge::{Asar, AsarLibrary};
//! use serde_json::json;
//!
//! let asar = Asar::new(AsarLibrary::open_by_name("asar")?);
//! if !asar.patch(&json!({ "assemblyPath": "smw.asm", "defines": { "_VER": "1" } }))? {
//!     for error in asar.errors() {
//!         eprintln!("{}", error.full_error);
//!     }
//! }
//! ```

pub mod bridge;
pub mod diagnostics;
pub mod engine;
pub mod error;
#[doc(hidden)]
pub mod harness;
pub mod host;
#[doc(hidden)]
pub mod invariant_ppt;
pub mod library;
pub mod params;
pub mod raw;
pub mod request;

pub use bridge::{invoke, Asar, EngineGuard, PatchOutcome};
pub use diagnostics::{Define, Diagnostic, Label, StackFrame};
pub use engine::{ApiVersion, Engine, EngineVersion};
pub use error::{BridgeError, Result};
pub use library::AsarLibrary;
pub use params::NativePatchParams;
pub use request::{PatchRequest, DEFAULT_ROM_SIZE};
