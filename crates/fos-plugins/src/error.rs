//! Plugin host errors

use std::path::PathBuf;

use fos_npapi::*;

/// Failure codes exchanged with plugins.
///
/// Every variant maps onto one ABI result code; success is `Ok(())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NpError {
    #[error("generic plugin error")]
    Generic,

    #[error("invalid plugin instance")]
    InvalidInstance,

    #[error("invalid function table")]
    InvalidFuncTable,

    #[error("plugin module failed to load")]
    ModuleLoadFailed,

    #[error("out of memory")]
    OutOfMemory,

    #[error("invalid plugin")]
    InvalidPlugin,

    #[error("invalid plugin directory")]
    InvalidPluginDir,

    #[error("incompatible plugin version")]
    IncompatibleVersion,

    #[error("invalid parameter")]
    InvalidParam,

    #[error("invalid URL")]
    InvalidUrl,

    #[error("file not found")]
    FileNotFound,

    #[error("stream has no data")]
    NoData,

    #[error("stream is not seekable")]
    StreamNotSeekable,
}

pub type NpResult<T = ()> = Result<T, NpError>;

impl NpError {
    /// ABI code for this error.
    pub fn code(self) -> NPError {
        match self {
            Self::Generic => NPERR_GENERIC_ERROR,
            Self::InvalidInstance => NPERR_INVALID_INSTANCE_ERROR,
            Self::InvalidFuncTable => NPERR_INVALID_FUNCTABLE_ERROR,
            Self::ModuleLoadFailed => NPERR_MODULE_LOAD_FAILED_ERROR,
            Self::OutOfMemory => NPERR_OUT_OF_MEMORY_ERROR,
            Self::InvalidPlugin => NPERR_INVALID_PLUGIN_ERROR,
            Self::InvalidPluginDir => NPERR_INVALID_PLUGIN_DIR_ERROR,
            Self::IncompatibleVersion => NPERR_INCOMPATIBLE_VERSION_ERROR,
            Self::InvalidParam => NPERR_INVALID_PARAM,
            Self::InvalidUrl => NPERR_INVALID_URL,
            Self::FileNotFound => NPERR_FILE_NOT_FOUND,
            Self::NoData => NPERR_NO_DATA,
            Self::StreamNotSeekable => NPERR_STREAM_NOT_SEEKABLE,
        }
    }

    /// Interpret a code returned by a plugin. Unknown codes are generic errors.
    pub fn from_code(code: NPError) -> NpResult {
        match code {
            NPERR_NO_ERROR => Ok(()),
            NPERR_INVALID_INSTANCE_ERROR => Err(Self::InvalidInstance),
            NPERR_INVALID_FUNCTABLE_ERROR => Err(Self::InvalidFuncTable),
            NPERR_MODULE_LOAD_FAILED_ERROR => Err(Self::ModuleLoadFailed),
            NPERR_OUT_OF_MEMORY_ERROR => Err(Self::OutOfMemory),
            NPERR_INVALID_PLUGIN_ERROR => Err(Self::InvalidPlugin),
            NPERR_INVALID_PLUGIN_DIR_ERROR => Err(Self::InvalidPluginDir),
            NPERR_INCOMPATIBLE_VERSION_ERROR => Err(Self::IncompatibleVersion),
            NPERR_INVALID_PARAM => Err(Self::InvalidParam),
            NPERR_INVALID_URL => Err(Self::InvalidUrl),
            NPERR_FILE_NOT_FOUND => Err(Self::FileNotFound),
            NPERR_NO_DATA => Err(Self::NoData),
            NPERR_STREAM_NOT_SEEKABLE => Err(Self::StreamNotSeekable),
            _ => Err(Self::Generic),
        }
    }
}

/// Collapse a host result into the code handed back to the plugin.
#[inline]
pub fn to_code(result: NpResult) -> NPError {
    match result {
        Ok(()) => NPERR_NO_ERROR,
        Err(err) => err.code(),
    }
}

/// Module discovery and loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// The file is a library but does not speak the plugin protocol
    #[error("Not a plugin: {0}")]
    NotAPlugin(PathBuf),

    /// A required entry point is missing
    #[error("Missing entry point: {0}")]
    MissingEntryPoint(&'static str),

    /// The library could not be opened
    #[error("Failed to open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// The plugin rejected initialization
    #[error("Plugin initialize failed: {0}")]
    InitializeFailed(NpError),

    /// The plugin's function table has a newer major version
    #[error("Incompatible plugin version: major {major}")]
    IncompatibleVersion { major: u16 },

    /// The module only tolerates one live instance
    #[error("Plugin does not allow multiple instances")]
    MultipleInstances,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_map_both_ways() {
        let all = [
            NpError::Generic,
            NpError::InvalidInstance,
            NpError::InvalidFuncTable,
            NpError::ModuleLoadFailed,
            NpError::OutOfMemory,
            NpError::InvalidPlugin,
            NpError::InvalidPluginDir,
            NpError::IncompatibleVersion,
            NpError::InvalidParam,
            NpError::InvalidUrl,
            NpError::FileNotFound,
            NpError::NoData,
            NpError::StreamNotSeekable,
        ];
        for err in all {
            assert_eq!(NpError::from_code(err.code()), Err(err));
        }
        assert_eq!(NpError::from_code(NPERR_NO_ERROR), Ok(()));
        assert_eq!(NpError::from_code(99), Err(NpError::Generic));
    }

    #[test]
    fn test_to_code() {
        assert_eq!(to_code(Ok(())), NPERR_NO_ERROR);
        assert_eq!(to_code(Err(NpError::InvalidUrl)), NPERR_INVALID_URL);
    }
}
