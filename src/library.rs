//! Loading the engine from a shared library.

use crate::bridge::engine_lock;
use crate::engine::{ApiVersion, Engine, EngineVersion};
use crate::error::{BridgeError, Result};
use crate::raw::{
    DefineListFn, ErrorListFn, LabelListFn, PatchFn, PrintListFn, RawDefineData, RawErrorData,
    RawLabelData, RawPatchParams, ResetFn, VersionFn,
};
use libloading::Library;
use std::ffi::{c_char, c_int};
use std::path::Path;

/// The engine shared library with its entry points resolved.
pub struct AsarLibrary {
    version: VersionFn,
    api_version: VersionFn,
    reset: ResetFn,
    max_rom_size: VersionFn,
    patch: PatchFn,
    errors: ErrorListFn,
    warnings: ErrorListFn,
    prints: PrintListFn,
    labels: LabelListFn,
    defines: DefineListFn,
    path: String,
    // Keeps the function pointers above alive; dropped last.
    _library: Library,
}

impl AsarLibrary {
    /// Load the engine from an explicit path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let library = unsafe { Library::new(path) }.map_err(|source| BridgeError::LibraryLoad {
            path: display.clone(),
            source,
        })?;
        Self::resolve(library, display)
    }

    /// Load the engine by base name (e.g. "asar"), letting the OS loader search.
    pub fn open_by_name(name: &str) -> Result<Self> {
        let file_name = platform_lib_name(name);
        let library =
            unsafe { Library::new(&file_name) }.map_err(|source| BridgeError::LibraryLoad {
                path: file_name.clone(),
                source,
            })?;
        Self::resolve(library, file_name)
    }

    fn resolve(library: Library, path: String) -> Result<Self> {
        // Safety: the symbol types are the engine's documented C signatures.
        let engine = unsafe {
            Self {
                version: symbol(&library, "asar_version\0")?,
                api_version: symbol(&library, "asar_apiversion\0")?,
                reset: symbol(&library, "asar_reset\0")?,
                max_rom_size: symbol(&library, "asar_maxromsize\0")?,
                patch: symbol(&library, "asar_patch\0")?,
                errors: symbol(&library, "asar_geterrors\0")?,
                warnings: symbol(&library, "asar_getwarnings\0")?,
                prints: symbol(&library, "asar_getprints\0")?,
                labels: symbol(&library, "asar_getalllabels\0")?,
                defines: symbol(&library, "asar_getalldefines\0")?,
                path,
                _library: library,
            }
        };
        let (version, api_version) = {
            let _guard = engine_lock();
            (engine.version(), engine.api_version())
        };
        log::info!(
            "loaded asar {} (api {}) from {}",
            EngineVersion::from_raw(version),
            ApiVersion::from_raw(api_version),
            engine.path
        );
        Ok(engine)
    }

    /// Path or file name the library was loaded from.
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// # Safety
///
/// `F` must match the symbol's actual signature. `name` is NUL-terminated.
unsafe fn symbol<F: Copy>(library: &Library, name: &'static str) -> Result<F> {
    library
        .get::<F>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|source| BridgeError::MissingSymbol {
            symbol: name.trim_end_matches('\0'),
            source,
        })
}

/// Platform file name for a library base name.
fn platform_lib_name(name: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{}.dll", name)
    }
    #[cfg(target_os = "macos")]
    {
        format!("lib{}.dylib", name)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        format!("lib{}.so", name)
    }
}

// Safety: the function pointers come from the engine library, which upholds
// the list-validity contract documented on `Engine`.
unsafe impl Engine for AsarLibrary {
    fn version(&self) -> c_int {
        unsafe { (self.version)() }
    }

    fn api_version(&self) -> c_int {
        unsafe { (self.api_version)() }
    }

    fn reset(&self) -> bool {
        unsafe { (self.reset)() }
    }

    fn max_rom_size(&self) -> c_int {
        unsafe { (self.max_rom_size)() }
    }

    unsafe fn patch(&self, params: &RawPatchParams) -> bool {
        (self.patch)(params)
    }

    fn errors(&self, count: &mut c_int) -> *const RawErrorData {
        unsafe { (self.errors)(count) }
    }

    fn warnings(&self, count: &mut c_int) -> *const RawErrorData {
        unsafe { (self.warnings)(count) }
    }

    fn prints(&self, count: &mut c_int) -> *const *const c_char {
        unsafe { (self.prints)(count) }
    }

    fn labels(&self, count: &mut c_int) -> *const RawLabelData {
        unsafe { (self.labels)(count) }
    }

    fn defines(&self, count: &mut c_int) -> *const RawDefineData {
        unsafe { (self.defines)(count) }
    }
}
