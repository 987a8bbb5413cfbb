//! Audit record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ucon_core::{ContentHash, CoreResult, Fingerprint, InstanceId, to_canonical_json};

/// What a record documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// An allow/deny access decision
    Decision,
    /// An artifact deletion caused by expiry or quota
    Deletion,
    /// A resource entering the repository
    Submission,
}

/// Record content supplied by the caller; sequencing and chaining are
/// added on append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Record kind
    pub kind: RecordKind,
    /// Operation name, e.g. `access-log`
    pub operation: String,
    /// Requesting principal
    pub actor: String,
    /// Requester's declared location
    pub location: String,
    /// Outcome
    pub allowed: bool,
    /// Denial or deletion reason
    pub reason: Option<String>,
    /// Policy class
    pub fingerprint: Option<Fingerprint>,
    /// Instance under the policy class
    pub instance_id: Option<InstanceId>,
}

impl AuditEntry {
    /// Create an access decision entry
    #[must_use]
    pub fn decision(operation: &str, actor: &str, location: &str, allowed: bool) -> Self {
        Self {
            kind: RecordKind::Decision,
            operation: operation.to_string(),
            actor: actor.to_string(),
            location: location.to_string(),
            allowed,
            reason: None,
            fingerprint: None,
            instance_id: None,
        }
    }

    /// Create a deletion entry
    #[must_use]
    pub fn deletion(operation: &str, actor: &str, location: &str, reason: &str) -> Self {
        Self {
            kind: RecordKind::Deletion,
            reason: Some(reason.to_string()),
            ..Self::decision(operation, actor, location, true)
        }
    }

    /// Create a submission entry
    #[must_use]
    pub fn submission(actor: &str) -> Self {
        Self {
            kind: RecordKind::Submission,
            ..Self::decision("submit", actor, "", true)
        }
    }

    /// Attach a reason
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attach the instance this entry concerns
    #[must_use]
    pub fn for_instance(mut self, fingerprint: Fingerprint, instance_id: InstanceId) -> Self {
        self.fingerprint = Some(fingerprint);
        self.instance_id = Some(instance_id);
        self
    }
}

/// A sealed, chained audit record as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Position in the stream, from 0
    pub sequence: u64,
    /// Append time
    pub timestamp: DateTime<Utc>,
    /// Record kind
    pub kind: RecordKind,
    /// Operation name
    pub operation: String,
    /// Requesting principal
    pub actor: String,
    /// Requester's declared location
    pub location: String,
    /// Outcome
    pub allowed: bool,
    /// Denial or deletion reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Policy class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    /// Instance under the policy class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    /// Hash of the previous record, zero for the first
    pub prev_hash: ContentHash,
    /// `SHA-256(prevHash || canonical JSON of this record without hash)`
    pub hash: ContentHash,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Unsealed<'a> {
    sequence: u64,
    timestamp: &'a DateTime<Utc>,
    kind: RecordKind,
    operation: &'a str,
    actor: &'a str,
    location: &'a str,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fingerprint: Option<&'a Fingerprint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance_id: Option<&'a InstanceId>,
    prev_hash: &'a ContentHash,
}

impl AuditRecord {
    /// Seal `entry` as record number `sequence` following `prev_hash`
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded
    pub fn seal(
        entry: AuditEntry,
        sequence: u64,
        timestamp: DateTime<Utc>,
        prev_hash: ContentHash,
    ) -> CoreResult<Self> {
        let mut record = Self {
            sequence,
            timestamp,
            kind: entry.kind,
            operation: entry.operation,
            actor: entry.actor,
            location: entry.location,
            allowed: entry.allowed,
            reason: entry.reason,
            fingerprint: entry.fingerprint,
            instance_id: entry.instance_id,
            prev_hash,
            hash: ContentHash::zero(),
        };
        record.hash = record.compute_hash()?;
        Ok(record)
    }

    /// Recompute the hash from the record's content
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded
    pub fn compute_hash(&self) -> CoreResult<ContentHash> {
        let canonical = to_canonical_json(&Unsealed {
            sequence: self.sequence,
            timestamp: &self.timestamp,
            kind: self.kind,
            operation: &self.operation,
            actor: &self.actor,
            location: &self.location,
            allowed: self.allowed,
            reason: self.reason.as_deref(),
            fingerprint: self.fingerprint.as_ref(),
            instance_id: self.instance_id.as_ref(),
            prev_hash: &self.prev_hash,
        })?;
        Ok(self.prev_hash.chain(canonical.as_bytes()))
    }
}
