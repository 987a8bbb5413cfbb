//! Identifiers for UCON entities.
//!
//! Fingerprints name a policy structure class, instance ids name one
//! (policy, log) pairing under a fingerprint, and dedup keys detect
//! resubmissions of the same pairing by the same owner.

use crate::error::{CoreError, CoreResult};
use crate::hash::ContentHash;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Structural fingerprint of a policy: hex SHA-256 of its canonical shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// Fingerprint of canonical shape bytes
    #[must_use]
    pub fn of_canonical(canonical: &[u8]) -> Self {
        Self(ContentHash::compute(canonical))
    }

    /// Wrap an already computed hash
    #[must_use]
    pub const fn from_hash(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// Underlying hash
    #[must_use]
    pub const fn as_hash(&self) -> &ContentHash {
        &self.0
    }

    /// Full hex form, used as the repository directory name
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Short form used in package names and log lines
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.0.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        ContentHash::from_hex(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidHash {
                reason: e.to_string(),
            })
    }
}

/// Instance identifier, unique and monotonically increasing per fingerprint
///
/// Rendered zero-padded to two digits (`01`, `02`, ..., `100`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u32);

impl InstanceId {
    /// The first id allocated under a fingerprint
    pub const FIRST: Self = Self(1);

    /// Create from raw value
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw value
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// The id allocated after this one
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidId {
                reason: format!("instance id must be decimal digits, got {:?}", s),
            });
        }
        let value: u32 = s.parse().map_err(|_| CoreError::InvalidId {
            reason: format!("instance id out of range: {}", s),
        })?;
        if value == 0 {
            return Err(CoreError::InvalidId {
                reason: "instance ids start at 01".to_string(),
            });
        }
        Ok(Self(value))
    }
}

impl Serialize for InstanceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Submission deduplication key: `owner:fingerprint:logContentHash`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    /// Build the key for one (owner, structure, log) triple
    #[must_use]
    pub fn new(owner: &str, fingerprint: &Fingerprint, log_hash: &ContentHash) -> Self {
        Self(format!("{}:{}:{}", owner, fingerprint, log_hash))
    }

    /// Key as string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_display() {
        assert_eq!(InstanceId::new(1).to_string(), "01");
        assert_eq!(InstanceId::new(12).to_string(), "12");
        assert_eq!(InstanceId::new(100).to_string(), "100");
    }

    #[test]
    fn test_instance_id_parse() {
        assert_eq!("01".parse::<InstanceId>().unwrap(), InstanceId::new(1));
        assert_eq!("7".parse::<InstanceId>().unwrap(), InstanceId::new(7));
        assert!("00".parse::<InstanceId>().is_err());
        assert!("../01".parse::<InstanceId>().is_err());
        assert!("".parse::<InstanceId>().is_err());
    }

    #[test]
    fn test_instance_id_ordering_is_numeric() {
        let mut ids = vec![InstanceId::new(100), InstanceId::new(9), InstanceId::new(10)];
        ids.sort();
        assert_eq!(ids, vec![InstanceId::new(9), InstanceId::new(10), InstanceId::new(100)]);
    }

    #[test]
    fn test_instance_id_serde_as_string() {
        let json = serde_json::to_string(&InstanceId::new(3)).unwrap();
        assert_eq!(json, "\"03\"");
    }

    #[test]
    fn test_fingerprint_roundtrip_and_short() {
        let fp = Fingerprint::of_canonical(b"{}");
        let parsed: Fingerprint = fp.to_hex().parse().unwrap();
        assert_eq!(parsed, fp);
        assert_eq!(fp.short().len(), 12);
        assert!("not-hex".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_dedup_key_scoped_by_owner() {
        let fp = Fingerprint::of_canonical(b"shape");
        let log = ContentHash::compute(b"log");
        let a = DedupKey::new("alice", &fp, &log);
        let b = DedupKey::new("bob", &fp, &log);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("alice:"));
        assert!(a.as_str().ends_with(&log.to_hex()));
    }
}
