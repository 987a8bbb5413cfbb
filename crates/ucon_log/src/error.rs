//! Audit errors.

use std::path::PathBuf;
use thiserror::Error;
use ucon_core::CoreError;

/// Audit result
pub type AuditResult<T> = Result<T, AuditError>;

/// Audit stream failures
#[derive(Debug, Error)]
pub enum AuditError {
    /// Stream file could not be read or written
    #[error("Audit I/O error at {path}: {source}")]
    Io {
        /// Stream or lock file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A line is not a valid record
    #[error("Corrupt audit record at line {line}: {reason}")]
    Corrupt {
        /// 1-based line number
        line: usize,
        /// Decoder message
        reason: String,
    },

    /// Hash chain does not verify
    #[error("Audit chain broken at sequence {sequence}: {reason}")]
    BrokenChain {
        /// Sequence of the first bad record
        sequence: u64,
        /// What failed
        reason: String,
    },

    /// Primitive failure (locks, encoding)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl AuditError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
