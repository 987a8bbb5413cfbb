//! Repository errors.

use std::path::PathBuf;
use thiserror::Error;
use ucon_codegen::GenerationError;
use ucon_core::{CoreError, Fingerprint, InstanceId};
use ucon_log::AuditError;
use ucon_policy::ParseError;

/// Repository result
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository failures
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Policy rejected before any storage mutation
    #[error("Policy rejected: {0}")]
    Parse(#[from] ParseError),

    /// A named technique has no implementation in the algorithm source
    #[error("Algorithm {name} not found in {}", searched.display())]
    MissingAlgorithm {
        /// Requested name
        name: String,
        /// Directory searched
        searched: PathBuf,
    },

    /// Storage failure
    #[error("Repository I/O error at {}: {source}", path.display())]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored data could not be decoded
    #[error("Corrupt repository data at {}: {reason}", path.display())]
    Corrupt {
        /// Offending path
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// No trusted application for this fingerprint
    #[error("Unknown fingerprint {0}")]
    UnknownFingerprint(Fingerprint),

    /// No such instance under the fingerprint
    #[error("Unknown instance {instance} under {fingerprint}")]
    UnknownInstance {
        /// Policy class
        fingerprint: Fingerprint,
        /// Requested instance
        instance: InstanceId,
    },

    /// Configuration file unusable
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Generated program failed its determinism check
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Audit append failed
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Primitive failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RepositoryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
