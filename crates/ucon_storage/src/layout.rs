//! On-disk layout of the repository.
//!
//! ```text
//! <root>/
//!   blobs/<sha256>                 log artifacts, stored once
//!   blobs/<sha256>.refs            paths linking to the artifact
//!   audit/resources/<sha256>.jsonl resource audit streams
//!   generated_tas/<fingerprint>/
//!     configs/<id>/policy.ttl, policy_config.json, state/<phase>.json
//!     data/<id>/<log file>
//!     outputs/<id>/<Algorithm>.out
//!     algorithms/<Algorithm>.rs, algorithm_manifest.json
//!     audit/<id>.jsonl
//!     mapping.json
//!     main.rs, Cargo.toml
//! ```

use std::path::{Path, PathBuf};
use ucon_codegen::{MAIN_FILE, MANIFEST_FILE};
use ucon_core::{ContentHash, Fingerprint, InstanceId};
use ucon_log::GENERATED_DIR;
use ucon_policy::Phase;

/// Raw policy source file
pub const POLICY_FILE: &str = "policy.ttl";
/// Structured per-instance config
pub const CONFIG_FILE: &str = "policy_config.json";
/// Instance index
pub const MAPPING_FILE: &str = "mapping.json";
/// Algorithm content hashes
pub const ALGORITHM_MANIFEST_FILE: &str = "algorithm_manifest.json";
/// Algorithm source extension
pub const ALGORITHM_EXT: &str = "rs";
/// Output file extension
pub const OUTPUT_EXT: &str = "out";

/// Path computations for one repository root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Create a layout rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Repository root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `generated_tas/`
    #[must_use]
    pub fn generated_dir(&self) -> PathBuf {
        self.root.join(GENERATED_DIR)
    }

    /// Directory of one trusted application
    #[must_use]
    pub fn ta_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.generated_dir().join(fp.to_hex())
    }

    /// Cross-process lock for a fingerprint
    #[must_use]
    pub fn lock_path(&self, fp: &Fingerprint) -> PathBuf {
        self.ta_dir(fp).join(".lock")
    }

    /// `configs/`
    #[must_use]
    pub fn configs_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.ta_dir(fp).join("configs")
    }

    /// `configs/<id>/`
    #[must_use]
    pub fn config_dir(&self, fp: &Fingerprint, id: InstanceId) -> PathBuf {
        self.configs_dir(fp).join(id.to_string())
    }

    /// `configs/<id>/policy.ttl`
    #[must_use]
    pub fn policy_path(&self, fp: &Fingerprint, id: InstanceId) -> PathBuf {
        self.config_dir(fp, id).join(POLICY_FILE)
    }

    /// `configs/<id>/policy_config.json`
    #[must_use]
    pub fn config_path(&self, fp: &Fingerprint, id: InstanceId) -> PathBuf {
        self.config_dir(fp, id).join(CONFIG_FILE)
    }

    /// `configs/<id>/state/<phase>.json`
    #[must_use]
    pub fn state_path(&self, fp: &Fingerprint, id: InstanceId, phase: Phase) -> PathBuf {
        self.config_dir(fp, id)
            .join("state")
            .join(format!("{}.json", phase))
    }

    /// `data/<id>/`
    #[must_use]
    pub fn data_dir(&self, fp: &Fingerprint, id: InstanceId) -> PathBuf {
        self.ta_dir(fp).join("data").join(id.to_string())
    }

    /// `data/<id>/<log file>`
    #[must_use]
    pub fn log_path(&self, fp: &Fingerprint, id: InstanceId, file_name: &str) -> PathBuf {
        self.data_dir(fp, id).join(file_name)
    }

    /// `outputs/<id>/`
    #[must_use]
    pub fn outputs_dir(&self, fp: &Fingerprint, id: InstanceId) -> PathBuf {
        self.ta_dir(fp).join("outputs").join(id.to_string())
    }

    /// `outputs/<id>/<Algorithm>.out`
    #[must_use]
    pub fn output_path(&self, fp: &Fingerprint, id: InstanceId, algorithm: &str) -> PathBuf {
        self.outputs_dir(fp, id)
            .join(format!("{}.{}", algorithm, OUTPUT_EXT))
    }

    /// `algorithms/`
    #[must_use]
    pub fn algorithms_dir(&self, fp: &Fingerprint) -> PathBuf {
        self.ta_dir(fp).join("algorithms")
    }

    /// `algorithms/<Algorithm>.rs`
    #[must_use]
    pub fn algorithm_path(&self, fp: &Fingerprint, algorithm: &str) -> PathBuf {
        self.algorithms_dir(fp)
            .join(format!("{}.{}", algorithm, ALGORITHM_EXT))
    }

    /// `algorithms/algorithm_manifest.json`
    #[must_use]
    pub fn algorithm_manifest_path(&self, fp: &Fingerprint) -> PathBuf {
        self.algorithms_dir(fp).join(ALGORITHM_MANIFEST_FILE)
    }

    /// `mapping.json`
    #[must_use]
    pub fn mapping_path(&self, fp: &Fingerprint) -> PathBuf {
        self.ta_dir(fp).join(MAPPING_FILE)
    }

    /// Generated entry point
    #[must_use]
    pub fn main_path(&self, fp: &Fingerprint) -> PathBuf {
        self.ta_dir(fp).join(MAIN_FILE)
    }

    /// Generated build descriptor; its presence marks a complete program
    #[must_use]
    pub fn build_descriptor_path(&self, fp: &Fingerprint) -> PathBuf {
        self.ta_dir(fp).join(MANIFEST_FILE)
    }

    /// `blobs/`
    #[must_use]
    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    /// Stored artifact
    #[must_use]
    pub fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.blobs_dir().join(hash.to_hex())
    }

    /// Path relative to the root, as recorded in indexes
    #[must_use]
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Resolve a path recorded by [`Layout::relative`]
    #[must_use]
    pub fn resolve(&self, recorded: &str) -> PathBuf {
        self.root.join(recorded)
    }
}
