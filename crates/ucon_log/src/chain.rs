//! Chain verification.
//!
//! Each record's `prevHash` must equal the previous record's `hash`, its
//! sequence must follow the previous one, and its own hash must match its
//! content. The first record chains from the zero hash.

use crate::error::{AuditError, AuditResult};
use crate::record::AuditRecord;
use ucon_core::ContentHash;

/// Result of a successful verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainReport {
    /// Records verified
    pub records: u64,
    /// Hash of the last record, zero for an empty stream
    pub head: ContentHash,
}

/// Incremental chain verifier
#[derive(Debug, Clone)]
pub struct ChainVerifier {
    expected_prev: ContentHash,
    expected_sequence: u64,
}

impl ChainVerifier {
    /// Create a verifier for a stream starting at the genesis record
    #[must_use]
    pub fn new() -> Self {
        Self {
            expected_prev: ContentHash::zero(),
            expected_sequence: 0,
        }
    }

    /// Check the next record
    ///
    /// # Errors
    ///
    /// Returns `AuditError::BrokenChain` on a sequence gap, a link mismatch
    /// or a content hash mismatch
    pub fn push(&mut self, record: &AuditRecord) -> AuditResult<()> {
        let broken = |reason: &str| AuditError::BrokenChain {
            sequence: record.sequence,
            reason: reason.to_string(),
        };
        if record.sequence != self.expected_sequence {
            return Err(broken(&format!(
                "expected sequence {}",
                self.expected_sequence
            )));
        }
        if record.prev_hash != self.expected_prev {
            return Err(broken("previous hash does not match"));
        }
        if record.compute_hash()? != record.hash {
            return Err(broken("record content does not match its hash"));
        }
        self.expected_prev = record.hash;
        self.expected_sequence += 1;
        Ok(())
    }

    /// Summary of what has been verified so far
    #[must_use]
    pub fn report(&self) -> ChainReport {
        ChainReport {
            records: self.expected_sequence,
            head: self.expected_prev,
        }
    }
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify a whole stream
///
/// # Errors
///
/// Returns the first chain violation
pub fn verify_records(records: &[AuditRecord]) -> AuditResult<ChainReport> {
    let mut verifier = ChainVerifier::new();
    for record in records {
        verifier.push(record)?;
    }
    Ok(verifier.report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditEntry;
    use chrono::{TimeZone, Utc};

    fn chain(n: u64) -> Vec<AuditRecord> {
        let mut prev = ContentHash::zero();
        (0..n)
            .map(|i| {
                let record = AuditRecord::seal(
                    AuditEntry::decision("access-log", "pubk1", "it", i % 2 == 0),
                    i,
                    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, i as u32).unwrap(),
                    prev,
                )
                .unwrap();
                prev = record.hash;
                record
            })
            .collect()
    }

    #[test]
    fn test_valid_chain() {
        let records = chain(4);
        let report = verify_records(&records).unwrap();
        assert_eq!(report.records, 4);
        assert_eq!(report.head, records[3].hash);
    }

    #[test]
    fn test_empty_chain() {
        let report = verify_records(&[]).unwrap();
        assert_eq!(report.records, 0);
        assert_eq!(report.head, ContentHash::zero());
    }

    #[test]
    fn test_tampered_content_detected() {
        let mut records = chain(3);
        records[1].actor = "mallory".to_string();
        let err = verify_records(&records).unwrap_err();
        assert!(matches!(err, AuditError::BrokenChain { sequence: 1, .. }));
    }

    #[test]
    fn test_removed_record_detected() {
        let mut records = chain(3);
        records.remove(1);
        assert!(matches!(
            verify_records(&records).unwrap_err(),
            AuditError::BrokenChain { sequence: 2, .. }
        ));
    }
}
