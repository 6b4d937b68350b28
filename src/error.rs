//! Error taxonomy for the bridge.
//!
//! An engine-reported patch failure is not an error here: `patch` returns
//! `Ok(false)` and the details come from the diagnostic queries.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors surfaced to the immediate caller of a bridge operation.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required request field is absent or has the wrong type.
    #[error("missing or invalid field `{0}`")]
    MissingOrInvalidField(&'static str),

    /// A string bound for the engine contains an interior NUL byte.
    #[error("field `{field}` contains an interior NUL byte")]
    InteriorNul {
        /// Request field the string came from.
        field: &'static str,
    },

    /// The output ROM buffer could not be reserved.
    #[error("failed to allocate a {bytes}-byte ROM buffer")]
    AllocationFailed {
        /// Requested capacity.
        bytes: usize,
    },

    /// A table has more entries than the engine's `int` count can describe.
    #[error("field `{field}` has {len} entries, more than the engine accepts")]
    TooManyEntries {
        /// Request field the table came from.
        field: &'static str,
        /// Number of entries requested.
        len: usize,
    },

    /// The engine shared library could not be opened.
    #[error("failed to load engine library '{path}': {source}")]
    LibraryLoad {
        /// Path or file name handed to the loader.
        path: String,
        /// Loader error.
        #[source]
        source: libloading::Error,
    },

    /// A required engine entry point is missing from the library.
    #[error("engine symbol `{symbol}` not found: {source}")]
    MissingSymbol {
        /// Symbol name.
        symbol: &'static str,
        /// Loader error.
        #[source]
        source: libloading::Error,
    },

    /// Host read of a property the bridge does not expose.
    #[error("unknown property `{0}`")]
    UnknownProperty(String),

    /// Host call of a method the bridge does not expose.
    #[error("unknown method `{0}`")]
    UnknownMethod(String),

    /// Host call without a required positional argument.
    #[error("method `{method}` requires argument {index}")]
    MissingArgument {
        /// Method name.
        method: &'static str,
        /// Zero-based argument position.
        index: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
