//! Per-phase access counters.

use crate::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use ucon_core::fs as durable;

/// Mutable counters for one (instance, phase)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessState {
    /// Successful accesses so far
    pub access_count: u64,
    /// The governed artifact was deleted; terminal
    pub deleted: bool,
    /// Time of the last successful access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_access: Option<DateTime<Utc>>,
}

impl AccessState {
    /// Load the state, default if absent
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be decoded
    pub fn load(path: &Path) -> RepositoryResult<Self> {
        durable::read_json_opt(path)
            .map(Option::unwrap_or_default)
            .map_err(|e| RepositoryError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Replace the state atomically
    ///
    /// # Errors
    ///
    /// Returns error on filesystem failure
    pub fn save(&self, path: &Path) -> RepositoryResult<()> {
        durable::write_json_atomic(path, self)?;
        Ok(())
    }

    /// Count one successful access
    pub fn record_access(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_access = Some(now);
    }

    /// Mark the artifact deleted
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_state_is_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let state = AccessState::load(&dir.path().join("log-access.json")).unwrap();
        assert_eq!(state, AccessState::default());
    }

    #[test]
    fn test_record_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("log-access.json");
        let mut state = AccessState::default();
        state.record_access(Utc::now());
        state.record_access(Utc::now());
        state.mark_deleted();
        state.save(&path).unwrap();

        let loaded = AccessState::load(&path).unwrap();
        assert_eq!(loaded.access_count, 2);
        assert!(loaded.deleted);
        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["accessCount"], 2);
    }
}
