//! Per-fingerprint instance index (`mapping.json`).

use crate::error::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use ucon_core::{ContentHash, DedupKey, InstanceId, fs as durable};
use ucon_policy::AuthorizedUsers;

/// One instance as recorded in the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Log file name inside the data directory
    pub log_file: String,
    /// Config directory, relative to the repository root
    pub config_path: String,
    /// Data directory, relative to the repository root
    pub data_path: String,
    /// Effective actors per phase
    pub authorized_users: AuthorizedUsers,
    /// Submitting principal
    pub owner: String,
    /// Resubmission key
    pub dedup_key: DedupKey,
    /// Content hash of the log artifact
    pub log_hash: ContentHash,
}

/// Instance index, ordered by id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: BTreeMap<InstanceId, MappingEntry>,
}

impl Mapping {
    /// Load the index, empty if it does not exist yet
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

    /// Replace the index atomically
    ///
    /// # Errors
    ///
    /// Returns error on filesystem failure
    pub fn save(&self, path: &Path) -> RepositoryResult<()> {
        durable::write_json_atomic(path, self)?;
        Ok(())
    }

    /// Entry for `id`
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&MappingEntry> {
        self.entries.get(&id)
    }

    /// Record an entry
    pub fn insert(&mut self, id: InstanceId, entry: MappingEntry) {
        self.entries.insert(id, entry);
    }

    /// Instance already created for `key`
    #[must_use]
    pub fn find_by_dedup(&self, key: &DedupKey) -> Option<InstanceId> {
        self.entries
            .iter()
            .find(|(_, entry)| &entry.dedup_key == key)
            .map(|(id, _)| *id)
    }

    /// Number of instances
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no instance exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order
    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &MappingEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }
}
