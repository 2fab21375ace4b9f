//! Native library binding
//!
//! Opening a shared object and resolving its entry points is the only place
//! the host touches the dynamic loader. Everything above this module works
//! with a validated [`EntryPoints`] value.

use std::path::{Path, PathBuf};

use fos_npapi::*;

use crate::error::ModuleError;

/// Entry points every module exports, resolved and type-checked.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoints {
    pub initialize: NP_InitializeFunc,
    pub shutdown: NP_ShutdownFunc,
    pub get_mime_description: NP_GetMIMEDescriptionFunc,
    pub get_entry_points: Option<NP_GetEntryPointsFunc>,
    pub get_value: Option<NP_GetValueFunc>,
}

/// An opened library. Entry points stay valid while it is alive.
pub trait NativeLibrary {
    fn path(&self) -> &Path;

    fn entry_points(&self) -> Result<EntryPoints, ModuleError>;
}

/// Opens libraries by path.
pub trait LibraryProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, ModuleError>;
}

/// Library opened through the platform dynamic loader.
pub struct DynamicLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl DynamicLibrary {
    /// Resolve a required symbol.
    ///
    /// # Safety
    /// `T` must be the symbol's real function type.
    unsafe fn required<T: Copy>(&self, symbol: &[u8], name: &'static str) -> Result<T, ModuleError> {
        unsafe {
            self.library
                .get::<T>(symbol)
                .map(|s| *s)
                .map_err(|_| ModuleError::MissingEntryPoint(name))
        }
    }

    /// # Safety
    /// As for [`Self::required`].
    unsafe fn optional<T: Copy>(&self, symbol: &[u8]) -> Option<T> {
        unsafe { self.library.get::<T>(symbol).ok().map(|s| *s) }
    }
}

impl NativeLibrary for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry_points(&self) -> Result<EntryPoints, ModuleError> {
        // SAFETY: symbol types follow the plugin ABI definitions.
        unsafe {
            Ok(EntryPoints {
                initialize: self.required(NP_INITIALIZE_SYMBOL, "NP_Initialize")?,
                shutdown: self.required(NP_SHUTDOWN_SYMBOL, "NP_Shutdown")?,
                get_mime_description: self.required(NP_GET_MIME_DESCRIPTION_SYMBOL, "NP_GetMIMEDescription")?,
                get_entry_points: self.optional(NP_GET_ENTRY_POINTS_SYMBOL),
                get_value: self.optional(NP_GET_VALUE_SYMBOL),
            })
        }
    }
}

impl std::fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLibrary").field("path", &self.path).finish()
    }
}

/// Opens modules with the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLibraryProvider;

impl LibraryProvider for DynamicLibraryProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn NativeLibrary>, ModuleError> {
        // SAFETY: loading a library runs its initializers; modules are only
        // opened from the configured plugin directories.
        let library = unsafe { libloading::Library::new(path) }.map_err(|err| ModuleError::Open {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        tracing::debug!("Opened plugin library {}", path.display());
        Ok(Box::new(DynamicLibrary {
            path: path.to_path_buf(),
            library,
        }))
    }
}

/// Whether a file looks like a loadable module for this platform.
pub fn is_plugin_file(path: &Path) -> bool {
    let expected = if cfg!(target_os = "macos") {
        "dylib"
    } else if cfg!(windows) {
        "dll"
    } else {
        "so"
    };
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(expected))
}
