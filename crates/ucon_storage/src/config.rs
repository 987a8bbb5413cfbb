//! Repository configuration.

use crate::error::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use ucon_codegen::DEFAULT_RUNTIME_DEPENDENCY;

/// Default algorithm source directory, relative to the root
pub const DEFAULT_ALGORITHM_SOURCE: &str = "algorithm_repository";

/// Repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Repository root
    pub root: PathBuf,
    /// Directory holding `<Algorithm>.rs` sources; `<root>/algorithm_repository`
    /// when unset
    pub algorithm_source: Option<PathBuf>,
    /// `ucon_runtime` dependency spec written into generated build descriptors
    pub runtime_dependency: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            algorithm_source: None,
            runtime_dependency: DEFAULT_RUNTIME_DEPENDENCY.to_string(),
        }
    }
}

impl RepositoryConfig {
    /// Create a configuration rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Set the algorithm source directory
    #[must_use]
    pub fn with_algorithm_source(mut self, dir: impl Into<PathBuf>) -> Self {
        self.algorithm_source = Some(dir.into());
        self
    }

    /// Set the runtime dependency spec
    #[must_use]
    pub fn with_runtime_dependency(mut self, spec: impl Into<String>) -> Self {
        self.runtime_dependency = spec.into();
        self
    }

    /// Effective algorithm source directory
    #[must_use]
    pub fn algorithm_source_dir(&self) -> PathBuf {
        self.algorithm_source
            .clone()
            .unwrap_or_else(|| self.root.join(DEFAULT_ALGORITHM_SOURCE))
    }

    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded
    pub fn load(path: &Path) -> RepositoryResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| RepositoryError::io(path, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RepositoryError::Config(format!("{}: {}", path.display(), e)))
    }
}
