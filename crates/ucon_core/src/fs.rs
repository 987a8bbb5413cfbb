//! Durable file writes.

use crate::error::{CoreError, CoreResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

fn ensure_parent(path: &Path) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
    }
    Ok(())
}

/// Write `bytes` to `path` and fsync before returning
///
/// # Errors
///
/// Returns error on any filesystem failure
pub fn write_durable(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    ensure_parent(path)?;
    let mut file = File::create(path).map_err(|e| CoreError::io(path, e))?;
    file.write_all(bytes).map_err(|e| CoreError::io(path, e))?;
    file.sync_all().map_err(|e| CoreError::io(path, e))
}

/// Replace `path` with `bytes` so readers see either the old or the new
/// content, never a torn file.
///
/// # Errors
///
/// Returns error on any filesystem failure
pub fn write_atomic(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    ensure_parent(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| CoreError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| CoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| CoreError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))
}

/// Serialize `value` as pretty JSON and replace `path` atomically
///
/// # Errors
///
/// Returns error on encoding or filesystem failure
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Read and decode a JSON file, `None` if it does not exist
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or decoded
pub fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

/// Remove a file. Removing an absent file is a no-op.
///
/// Returns whether something was removed.
///
/// # Errors
///
/// Returns error on failures other than the file being absent
pub fn remove_file_idempotent(path: &Path) -> CoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

/// Remove a directory tree. Removing an absent directory is a no-op.
///
/// # Errors
///
/// Returns error on failures other than the directory being absent
pub fn remove_dir_idempotent(path: &Path) -> CoreResult<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("state.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        // No temp file left behind
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_json_roundtrip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        assert_eq!(read_json_opt::<Counter>(&path).unwrap(), None);
        write_json_atomic(&path, &Counter { count: 3 }).unwrap();
        assert_eq!(read_json_opt::<Counter>(&path).unwrap(), Some(Counter { count: 3 }));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.xes");
        write_durable(&path, b"<log/>").unwrap();
        assert!(remove_file_idempotent(&path).unwrap());
        assert!(!remove_file_idempotent(&path).unwrap());
        assert!(!remove_dir_idempotent(&dir.path().join("missing")).unwrap());
    }
}
