//! Enforcement errors and denial reasons.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ucon_core::CoreError;
use ucon_log::AuditError;
use ucon_storage::RepositoryError;

/// Enforcement result
pub type EnforcementResult<T> = Result<T, EnforcementError>;

/// Why a request was refused. Every denial is audited before it is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Denial {
    /// The artifact was deleted by expiration or quota
    #[error("artifact expired")]
    Expired,
    /// Actor not in the phase's access-control list
    #[error("actor not authorized")]
    Unauthorized,
    /// Requester location not allowed
    #[error("location not allowed")]
    LocationNotAllowed,
    /// Access quota used up; the artifact has been deleted
    #[error("access quota exceeded")]
    QuotaExceeded,
    /// Algorithm not listed in the policy's techniques
    #[error("algorithm not permitted")]
    AlgorithmNotPermitted,
    /// Request outside the permitted access window
    #[error("outside the permitted time window")]
    OutsideTimeWindow,
    /// The requested output was never produced
    #[error("output unavailable")]
    OutputUnavailable,
    /// No such instance
    #[error("unknown instance")]
    UnknownInstance,
}

impl Denial {
    /// Stable reason code recorded in audit records
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Unauthorized => "unauthorized",
            Self::LocationNotAllowed => "location-not-allowed",
            Self::QuotaExceeded => "quota-exceeded",
            Self::AlgorithmNotPermitted => "algorithm-not-permitted",
            Self::OutsideTimeWindow => "outside-time-window",
            Self::OutputUnavailable => "output-unavailable",
            Self::UnknownInstance => "unknown-instance",
        }
    }
}

/// XES handling failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XesError {
    /// Not well-formed XML
    #[error("Malformed XES: {0}")]
    Malformed(String),
    /// Root element is not `<log>`
    #[error("Expected <log> root, found <{0}>")]
    UnexpectedRoot(String),
    /// Serialization failed
    #[error("XES write failed: {0}")]
    Emit(String),
}

/// Enforcement failures
#[derive(Debug, Error)]
pub enum EnforcementError {
    /// Request refused by a gate
    #[error("Denied: {0}")]
    Denied(#[from] Denial),

    /// Permitted algorithm with no linked implementation
    #[error("Algorithm {0} is permitted but not linked into this program")]
    AlgorithmUnavailable(String),

    /// Algorithm returned an error
    #[error("Algorithm {name} failed: {message}")]
    AlgorithmFailed {
        /// Algorithm name
        name: String,
        /// Error reported by the algorithm
        message: String,
    },

    /// Log could not be parsed or written
    #[error(transparent)]
    Xes(#[from] XesError),

    /// Storage failure
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Audit append failed
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Primitive failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl EnforcementError {
    /// The denial, if this is one
    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Denied(denial) => Some(denial),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_serde() {
        for denial in [
            Denial::Expired,
            Denial::QuotaExceeded,
            Denial::AlgorithmNotPermitted,
            Denial::OutputUnavailable,
        ] {
            let json = serde_json::to_value(&denial).unwrap();
            assert_eq!(json, denial.code());
        }
    }
}
