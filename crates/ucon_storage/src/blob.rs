//! Content-addressed log artifacts.
//!
//! Each distinct log is stored once under `blobs/<sha256>` and linked into
//! every instance data directory that uses it. A `<sha256>.refs` file lists
//! the linked paths; releasing the last one removes the blob.

use crate::error::{RepositoryError, RepositoryResult};
use crate::layout::Layout;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use ucon_core::{ContentHash, FileLock, fs as durable};

/// Shared blob store under `<root>/blobs`
#[derive(Debug)]
pub struct BlobStore {
    layout: Layout,
    guard: Mutex<()>,
}

impl BlobStore {
    /// Create a store for `layout`
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            guard: Mutex::new(()),
        }
    }

    fn refs_path(&self, hash: &ContentHash) -> PathBuf {
        self.layout.blobs_dir().join(format!("{}.refs", hash))
    }

    fn locked<T>(&self, f: impl FnOnce() -> RepositoryResult<T>) -> RepositoryResult<T> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let _file = FileLock::acquire(self.layout.blobs_dir().join(".lock"))?;
        f()
    }

    fn read_refs(&self, hash: &ContentHash) -> RepositoryResult<BTreeSet<String>> {
        Ok(durable::read_json_opt(&self.refs_path(hash))?.unwrap_or_default())
    }

    /// Whether the blob is stored
    #[must_use]
    pub fn exists(&self, hash: &ContentHash) -> bool {
        self.layout.blob_path(hash).is_file()
    }

    /// Paths currently linked to the blob, relative to the repository root
    ///
    /// # Errors
    ///
    /// Returns error if the reference list cannot be read
    pub fn refs(&self, hash: &ContentHash) -> RepositoryResult<Vec<String>> {
        Ok(self.read_refs(hash)?.into_iter().collect())
    }

    /// Store `bytes` if not already present and return their hash
    ///
    /// # Errors
    ///
    /// Returns error on filesystem failure
    pub fn put(&self, bytes: &[u8]) -> RepositoryResult<ContentHash> {
        let hash = ContentHash::compute(bytes);
        self.locked(|| {
            let path = self.layout.blob_path(&hash);
            if path.is_file() {
                tracing::debug!(hash = %hash, "blob already stored");
            } else {
                durable::write_atomic(&path, bytes)?;
                tracing::debug!(hash = %hash, size = bytes.len(), "blob stored");
            }
            Ok(hash)
        })
    }

    /// Link a stored blob to `dest` and record the reference
    ///
    /// Falls back to a copy when hard links are not supported.
    ///
    /// # Errors
    ///
    /// Returns error if the blob is missing or the link cannot be created
    pub fn link(&self, hash: &ContentHash, dest: &Path) -> RepositoryResult<()> {
        self.locked(|| {
            let source = self.layout.blob_path(hash);
            if !source.is_file() {
                return Err(RepositoryError::Corrupt {
                    path: source,
                    reason: "blob not stored".to_string(),
                });
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| RepositoryError::io(parent, e))?;
            }
            durable::remove_file_idempotent(dest)?;
            if let Err(e) = fs::hard_link(&source, dest) {
                tracing::warn!(
                    error = %e,
                    dest = %dest.display(),
                    "hard link failed, copying blob"
                );
                let bytes = fs::read(&source).map_err(|e| RepositoryError::io(&source, e))?;
                durable::write_durable(dest, &bytes)?;
            }
            let mut refs = self.read_refs(hash)?;
            refs.insert(self.layout.relative(dest));
            durable::write_json_atomic(&self.refs_path(hash), &refs)?;
            Ok(())
        })
    }

    /// Remove the link at `dest` and drop its reference. The blob itself is
    /// removed with its last reference.
    ///
    /// Releasing an already released path is a no-op. Returns whether the
    /// blob was removed.
    ///
    /// # Errors
    ///
    /// Returns error on filesystem failure
    pub fn release(&self, hash: &ContentHash, dest: &Path) -> RepositoryResult<bool> {
        self.locked(|| {
            durable::remove_file_idempotent(dest)?;
            let mut refs = self.read_refs(hash)?;
            refs.remove(&self.layout.relative(dest));
            if !refs.is_empty() {
                durable::write_json_atomic(&self.refs_path(hash), &refs)?;
                return Ok(false);
            }
            let removed = durable::remove_file_idempotent(&self.layout.blob_path(hash))?;
            durable::remove_file_idempotent(&self.refs_path(hash))?;
            if removed {
                tracing::info!(hash = %hash, "blob removed with its last reference");
            }
            Ok(removed)
        })
    }
}
