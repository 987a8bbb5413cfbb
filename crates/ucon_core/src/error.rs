//! Core error types for UCON.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid hash format
    #[error("Invalid hash: {reason}")]
    InvalidHash {
        /// Why the hash was rejected
        reason: String,
    },

    /// Invalid ID format
    #[error("Invalid ID: {reason}")]
    InvalidId {
        /// Why the id was rejected
        reason: String,
    },

    /// Invalid timestamp
    #[error("Invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// Why the timestamp was rejected
        reason: String,
    },

    /// Filesystem failure on a specific path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Encoding failure
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl CoreError {
    /// Wrap an I/O error with the path it happened on
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
