//! Submission contract consumed by upload front ends.
//!
//! Two parts in (policy, log), `{instanceId, fingerprint, paths, duplicate}`
//! out. Failures carry an HTTP-style status.

use crate::error::RepositoryError;
use crate::repository::{InstancePaths, Repository};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ucon_core::{Fingerprint, InstanceId};
use ucon_policy::{fingerprint, parse_policy};

/// Successful submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    /// Created or matched instance
    pub instance_id: InstanceId,
    /// Policy class
    pub fingerprint: Fingerprint,
    /// Instance locations, relative to the repository root
    pub paths: InstancePaths,
    /// The submission matched an existing instance
    pub duplicate: bool,
}

/// Submission failure
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// A required part was not supplied
    #[error("Missing submission part: {0}")]
    MissingPart(&'static str),

    /// Processing failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SubmissionError {
    /// HTTP status for the failure
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingPart(_) | Self::Repository(RepositoryError::Parse(_)) => 400,
            Self::Repository(
                RepositoryError::MissingAlgorithm { .. }
                | RepositoryError::UnknownFingerprint(_)
                | RepositoryError::UnknownInstance { .. },
            ) => 404,
            Self::Repository(_) => 500,
        }
    }
}

/// Accept a (policy, log) submission.
///
/// The log is stored under the file name the policy declares.
///
/// # Errors
///
/// Returns `MissingPart` when a part is absent or empty, otherwise the
/// repository failure
pub fn submit(
    repo: &Repository,
    policy: Option<&[u8]>,
    log: Option<&[u8]>,
) -> Result<SubmissionResponse, SubmissionError> {
    let policy = policy
        .filter(|p| !p.is_empty())
        .ok_or(SubmissionError::MissingPart("policy"))?;
    let log = log
        .filter(|l| !l.is_empty())
        .ok_or(SubmissionError::MissingPart("log"))?;

    let doc = parse_policy(policy).map_err(RepositoryError::from)?;
    let fp = fingerprint(&doc);
    let created = repo.create_instance(&fp, &doc, policy, log, &doc.object_id.file_name)?;
    Ok(SubmissionResponse {
        instance_id: created.instance_id,
        fingerprint: created.fingerprint,
        paths: created.paths,
        duplicate: created.duplicate,
    })
}
