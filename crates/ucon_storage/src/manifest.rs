//! Algorithm materialization and `algorithm_manifest.json`.

use crate::error::{RepositoryError, RepositoryResult};
use crate::layout::ALGORITHM_EXT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use ucon_core::{ContentHash, fs as durable};

/// One materialized algorithm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmRecord {
    /// File name inside `algorithms/`
    pub file: String,
    /// Content hash of the copied source
    pub sha256: ContentHash,
    /// Where the source was taken from
    pub source: String,
}

/// Content hashes of every algorithm a trusted application links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmManifest {
    /// Records keyed by algorithm name
    pub algorithms: BTreeMap<String, AlgorithmRecord>,
}

impl AlgorithmManifest {
    /// Load a manifest, `None` if absent
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be decoded
    pub fn load(path: &Path) -> RepositoryResult<Option<Self>> {
        durable::read_json_opt(path).map_err(|e| RepositoryError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write the manifest atomically
    ///
    /// # Errors
    ///
    /// Returns error on filesystem failure
    pub fn save(&self, path: &Path) -> RepositoryResult<()> {
        durable::write_json_atomic(path, self)?;
        Ok(())
    }

    /// Whether the manifest names exactly `algorithms`
    #[must_use]
    pub fn covers<'a>(&self, algorithms: impl IntoIterator<Item = &'a str>) -> bool {
        let wanted: Vec<&str> = algorithms.into_iter().collect();
        wanted.len() == self.algorithms.len()
            && wanted.iter().all(|name| self.algorithms.contains_key(*name))
    }
}

/// Find the source for `name` under `dir`.
///
/// An exact `<name>.rs` wins; otherwise the file name is matched
/// case-insensitively.
///
/// # Errors
///
/// Returns `RepositoryError::MissingAlgorithm` if no file matches
pub fn resolve_source(dir: &Path, name: &str) -> RepositoryResult<PathBuf> {
    let exact = dir.join(format!("{}.{}", name, ALGORITHM_EXT));
    if exact.is_file() {
        return Ok(exact);
    }
    let missing = || RepositoryError::MissingAlgorithm {
        name: name.to_string(),
        searched: dir.to_path_buf(),
    };
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(RepositoryError::io(dir, e)),
    };
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == ALGORITHM_EXT)
                && path
                    .file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().eq_ignore_ascii_case(name))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next().ok_or_else(missing)
}

/// Resolve every algorithm, failing on the first missing one
///
/// # Errors
///
/// Returns `RepositoryError::MissingAlgorithm` naming the first unresolved
/// algorithm
pub fn resolve_all<'a>(
    dir: &Path,
    algorithms: impl IntoIterator<Item = &'a str>,
) -> RepositoryResult<Vec<(String, PathBuf)>> {
    algorithms
        .into_iter()
        .map(|name| resolve_source(dir, name).map(|path| (name.to_string(), path)))
        .collect()
}

/// Copy resolved sources into `target` and build their manifest. Sources
/// land under their canonical `<name>.rs` file name.
///
/// # Errors
///
/// Returns error on filesystem failure
pub fn materialize(
    target: &Path,
    resolved: &[(String, PathBuf)],
) -> RepositoryResult<AlgorithmManifest> {
    let mut manifest = AlgorithmManifest::default();
    for (name, source) in resolved {
        let bytes = fs::read(source).map_err(|e| RepositoryError::io(source, e))?;
        let file = format!("{}.{}", name, ALGORITHM_EXT);
        durable::write_durable(&target.join(&file), &bytes)?;
        manifest.algorithms.insert(
            name.clone(),
            AlgorithmRecord {
                file,
                sha256: ContentHash::compute(&bytes),
                source: source.to_string_lossy().into_owned(),
            },
        );
        tracing::debug!(algorithm = %name, source = %source.display(), "algorithm materialized");
    }
    Ok(manifest)
}
