//! Error types for indexsync.
//!
//! Library crates use [`IndexSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all indexsync operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to the indexing backend.
    #[error("network error: {0}")]
    Network(String),

    /// The indexing backend answered a remote operation with a failure status.
    #[error("remote operation {operation} failed with HTTP {status}: {body}")]
    Remote {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad URL, malformed CLI payload, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IndexSyncError>;

impl IndexSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures reported by, or on the way to, the indexing backend.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Remote { .. })
    }
}
