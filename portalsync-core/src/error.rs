//! Error types for portalsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from settings document operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (save path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on load; includes file path and line context from serde_json.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The settings file did not exist at the expected path.
    #[error("settings not found at {path}")]
    ConfigNotFound { path: PathBuf },
}

/// Errors from the at-rest credential codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The obfuscation key must contain at least one character.
    #[error("credential key is empty")]
    EmptyKey,

    /// A character outside the single-byte range cannot be shifted and restored.
    #[error("character {ch:?} at position {position} is outside the encodable range")]
    Unrepresentable { ch: char, position: usize },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
