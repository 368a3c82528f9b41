//! Error types for the engine module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by a transcoding engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// The engine could not be brought into a usable state.
    #[error("Engine unavailable: {reason}")]
    Unavailable { reason: String },

    /// A virtual filesystem entry does not exist.
    #[error("No such file in engine filesystem: {name}")]
    NotFound { name: String },

    /// A name that cannot live in the flat virtual filesystem.
    #[error("Invalid engine file name: {name}")]
    InvalidName { name: String },

    /// An engine invocation ran but did not succeed.
    #[error("Engine command failed: {reason}")]
    ExecFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// An engine invocation exceeded the configured timeout.
    #[error("Engine command timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error while touching the virtual filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a new exec failed error with captured stderr output.
    pub fn exec_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ExecFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a new unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a not found error for a virtual filesystem name.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Whether the error means the file was already gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
