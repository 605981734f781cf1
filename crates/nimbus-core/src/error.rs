//! Error types for the Nimbus installer.
//!
//! One structured error enum shared by both crates, with a `Result` alias.
//! Phase failures in the orchestrator travel as values of this type; the
//! orchestrator's top level is the single point that turns them into a UI
//! error message.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Nimbus installer operations.
#[derive(Debug, Error)]
pub enum NimbusError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    // Configuration errors
    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Version errors
    #[error("invalid version string: {text:?}")]
    InvalidVersion { text: String },

    // Package / archive errors
    #[error("package error for {path}: {message}")]
    Package { path: PathBuf, message: String },

    #[error("unpack failed: {message}")]
    Unpack { message: String },

    // Transfer errors (non-empty error text from a fetch phase)
    #[error("transfer failed: {message}")]
    Transfer { message: String },

    // Privileged install process errors
    #[error("install process failed: {message}")]
    InstallProcess { message: String },

    // Environment errors (cannot create dirs, lock unavailable, ...)
    #[error("{message}")]
    Environment { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Nimbus operations.
pub type Result<T> = std::result::Result<T, NimbusError>;

impl From<std::io::Error> for NimbusError {
    fn from(err: std::io::Error) -> Self {
        NimbusError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for NimbusError {
    fn from(err: serde_json::Error) -> Self {
        NimbusError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl NimbusError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        NimbusError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// An environment error from a plain message.
    pub fn environment(message: impl Into<String>) -> Self {
        NimbusError::Environment {
            message: message.into(),
        }
    }
}
