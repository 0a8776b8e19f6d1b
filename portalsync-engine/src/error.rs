//! Error types for portalsync-engine.
//!
//! [`EngineError`] is reserved for run-fatal conditions. Everything that can
//! fail inside a single item or retention task is reported through
//! [`PlatformError`], [`BuildError`] or [`PipelineError`] and absorbed into a
//! stage outcome; none of those cross an item boundary.

use std::path::PathBuf;

use thiserror::Error;

use portalsync_core::{CodecError, ConfigError};

/// Conditions that halt the whole run before (or instead of) processing items.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The settings document could not be loaded or saved.
    #[error("settings error: {0}")]
    Config(#[from] ConfigError),

    /// The stored password could not be decoded or obfuscated.
    #[error("credential error: {0}")]
    Codec(#[from] CodecError),

    /// The staging directory could not be created.
    #[error("cannot create staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The run log could not be opened for appending.
    #[error("cannot open run log {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No session could be established with the portal.
    #[error("portal session failed: {0}")]
    Session(#[source] PlatformError),
}

/// Failure reported by a [`crate::platform::ContentPlatform`] call.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The request never produced a usable HTTP response.
    #[error("{operation} request failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The portal answered with an error envelope.
    #[error("{operation} rejected by portal ({code}): {message}{}", format_details(.details))]
    Api {
        operation: &'static str,
        code: i64,
        message: String,
        details: Vec<String>,
    },

    /// The portal answered, but not with what the operation expects.
    #[error("{operation} returned an unexpected response: {message}")]
    Response {
        operation: &'static str,
        message: String,
    },

    /// A local file needed for an upload could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by a [`crate::builder::ArtifactBuilder`] call.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The packaging helper ran and reported failure. `messages` carries the
    /// helper's diagnostic output and is logged line by line, not displayed.
    #[error("{operation} failed: {message}")]
    Failed {
        operation: String,
        message: String,
        messages: Vec<String>,
    },

    /// A named project, map or layer does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// No packaging helper is available to perform the operation.
    #[error("artifact builder unavailable: {0}")]
    Unavailable(String),
}

impl BuildError {
    /// Diagnostic lines from the builder, if any.
    pub fn messages(&self) -> &[String] {
        match self {
            BuildError::Failed { messages, .. } => messages,
            _ => &[],
        }
    }
}

/// Pipeline-level conditions that are not collaborator failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// No service definition matched; this pipeline only overwrites.
    #[error("no existing service definition found for '{name}'")]
    NoServiceDefinition { name: String },

    /// More than one service definition matched; the target is ambiguous.
    #[error("found {count} matching service definitions for '{name}'; expected exactly one")]
    AmbiguousServiceDefinition { name: String, count: usize },

    /// A tile replace job has no `itemid` to replace.
    #[error("'{name}' has no itemid to replace")]
    MissingItemId { name: String },

    /// The staged package could not be removed after a successful replace.
    #[error("cannot remove staged package {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Builder diagnostics carried by this error, if any.
    pub fn messages(&self) -> &[String] {
        match self {
            PipelineError::Build(err) => err.messages(),
            _ => &[],
        }
    }
}

fn format_details(details: &[String]) -> String {
    if details.is_empty() {
        String::new()
    } else {
        format!(" ({})", details.join("; "))
    }
}
