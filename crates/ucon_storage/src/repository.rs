//! Trusted-application repository.
//!
//! One generated enforcement program plus N configuration instances per
//! fingerprint. All mutation of a fingerprint directory happens under its
//! lock (in-process keyed mutex, then the `.lock` file), so concurrent first
//! submissions generate exactly once and instance ids never collide.

use crate::blob::BlobStore;
use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, RepositoryResult};
use crate::layout::Layout;
use crate::manifest::{self, AlgorithmManifest};
use crate::mapping::{Mapping, MappingEntry};
use crate::state::AccessState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ucon_codegen::{GeneratedProgram, GenerationInput, generate};
use ucon_core::{
    Clock, ContentHash, FileLock, Fingerprint, InstanceId, KeyedLocks, SystemClock, fs as durable,
};
use ucon_log::{AuditEntry, AuditLog, AuditRecord, StreamId};
use ucon_policy::{
    AuthorizedUsers, ParseError, Phase, PolicyDocument, RuleProfile, dedup_key, is_plain_file_name,
    log_content_hash,
};

/// Result of [`Repository::lookup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookup {
    /// A generated program exists for the fingerprint
    pub exists: bool,
    /// Instances recorded in the mapping
    pub instance_count: usize,
}

/// Paths of one instance, relative to the repository root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstancePaths {
    /// Config directory
    pub config_path: String,
    /// Data directory
    pub data_path: String,
    /// Linked log artifact
    pub log_path: String,
}

/// Result of [`Repository::create_instance`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedInstance {
    /// New or existing instance
    pub instance_id: InstanceId,
    /// Policy class
    pub fingerprint: Fingerprint,
    /// Instance locations
    pub paths: InstancePaths,
    /// The submission matched an existing instance
    pub duplicate: bool,
    /// This call generated the enforcement program
    pub generated: bool,
}

/// Everything stored for one fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    /// Policy class
    pub fingerprint: Fingerprint,
    /// Generated program present
    pub generated: bool,
    /// Materialized algorithms
    pub algorithms: Option<AlgorithmManifest>,
    /// Instance index
    pub instances: Mapping,
}

/// A stored instance loaded for enforcement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredInstance {
    /// Policy class
    pub fingerprint: Fingerprint,
    /// Instance id
    pub id: InstanceId,
    /// Structured config
    pub document: PolicyDocument,
    /// Index entry
    pub entry: MappingEntry,
}

/// Repository handle
pub struct Repository {
    config: RepositoryConfig,
    layout: Layout,
    blobs: BlobStore,
    audit: AuditLog,
    locks: KeyedLocks,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.layout.root())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Open (creating if needed) the repository described by `config`
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be created
    pub fn open(config: RepositoryConfig) -> RepositoryResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open with an explicit clock
    ///
    /// # Errors
    ///
    /// Returns error if the root cannot be created
    pub fn with_clock(config: RepositoryConfig, clock: Arc<dyn Clock>) -> RepositoryResult<Self> {
        let layout = Layout::new(&config.root);
        fs::create_dir_all(layout.generated_dir())
            .map_err(|e| RepositoryError::io(layout.generated_dir(), e))?;
        tracing::debug!(root = %layout.root().display(), "repository opened");
        Ok(Self {
            blobs: BlobStore::new(layout.clone()),
            audit: AuditLog::with_clock(layout.root(), Arc::clone(&clock)),
            locks: KeyedLocks::new(),
            config,
            layout,
            clock,
        })
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Path layout
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Log artifact store
    #[must_use]
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Audit streams
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Clock used for audit timestamps and enforcement
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn with_fingerprint_lock<T>(
        &self,
        fp: &Fingerprint,
        f: impl FnOnce() -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        self.locks.with_lock(&fp.to_hex(), || {
            let _file = FileLock::acquire(self.layout.lock_path(fp))?;
            f()
        })
    }

    /// Whether a program exists for `fp`, and how many instances it serves
    ///
    /// # Errors
    ///
    /// Returns error if the mapping cannot be read
    pub fn lookup(&self, fp: &Fingerprint) -> RepositoryResult<Lookup> {
        let mapping = Mapping::load(&self.layout.mapping_path(fp))?;
        Ok(Lookup {
            exists: self.layout.build_descriptor_path(fp).is_file(),
            instance_count: mapping.len(),
        })
    }

    /// Everything stored for `fp`
    ///
    /// # Errors
    ///
    /// Returns `UnknownFingerprint` if nothing is stored
    pub fn inspect(&self, fp: &Fingerprint) -> RepositoryResult<Inspection> {
        if !self.layout.ta_dir(fp).is_dir() {
            return Err(RepositoryError::UnknownFingerprint(*fp));
        }
        Ok(Inspection {
            fingerprint: *fp,
            generated: self.layout.build_descriptor_path(fp).is_file(),
            algorithms: AlgorithmManifest::load(&self.layout.algorithm_manifest_path(fp))?,
            instances: Mapping::load(&self.layout.mapping_path(fp))?,
        })
    }

    fn prepare_program(
        &self,
        fp: &Fingerprint,
        doc: &PolicyDocument,
    ) -> RepositoryResult<(Vec<(String, PathBuf)>, GeneratedProgram)> {
        let algorithms = doc.algorithms();
        let resolved = manifest::resolve_all(
            &self.config.algorithm_source_dir(),
            algorithms.iter().map(String::as_str),
        )?;
        let input = GenerationInput::new(*fp, algorithms, RuleProfile::of(doc))
            .with_runtime_dependency(self.config.runtime_dependency.clone());
        Ok((resolved, generate(&input)?))
    }

    /// Make sure the program and algorithms for `fp` are on disk.
    ///
    /// Returns `true` if this call wrote the program. When the program is
    /// already present it is regenerated in memory and compared.
    ///
    /// # Errors
    ///
    /// Returns `MissingAlgorithm` for an unresolvable technique, or
    /// `Generation` if the stored program differs from a fresh generation
    pub fn ensure_generated(&self, fp: &Fingerprint, doc: &PolicyDocument) -> RepositoryResult<bool> {
        let (resolved, program) = self.prepare_program(fp, doc)?;
        self.with_fingerprint_lock(fp, || self.ensure_generated_locked(fp, &resolved, &program))
    }

    fn ensure_generated_locked(
        &self,
        fp: &Fingerprint,
        resolved: &[(String, PathBuf)],
        program: &GeneratedProgram,
    ) -> RepositoryResult<bool> {
        let manifest_path = self.layout.algorithm_manifest_path(fp);
        let covered = AlgorithmManifest::load(&manifest_path)?
            .is_some_and(|m| m.covers(resolved.iter().map(|(name, _)| name.as_str())));
        if !covered {
            let manifest = manifest::materialize(&self.layout.algorithms_dir(fp), resolved)?;
            manifest.save(&manifest_path)?;
        }

        let ta_dir = self.layout.ta_dir(fp);
        if self.layout.build_descriptor_path(fp).is_file() {
            program.verify_against(|path| fs::read(ta_dir.join(path)).ok())?;
            tracing::debug!(fingerprint = %fp.short(), "enforcement program reused");
            return Ok(false);
        }
        for file in program.files() {
            durable::write_durable(&ta_dir.join(file.path), file.contents.as_bytes())?;
        }
        tracing::info!(
            fingerprint = %fp.short(),
            digest = %program.digest(),
            "enforcement program generated"
        );
        Ok(true)
    }

    fn paths(&self, fp: &Fingerprint, id: InstanceId, log_file: &str) -> InstancePaths {
        InstancePaths {
            config_path: self.layout.relative(&self.layout.config_dir(fp, id)),
            data_path: self.layout.relative(&self.layout.data_dir(fp, id)),
            log_path: self.layout.relative(&self.layout.log_path(fp, id, log_file)),
        }
    }

    fn allocate_id(&self, fp: &Fingerprint, mapping: &Mapping) -> RepositoryResult<InstanceId> {
        let configs = self.layout.configs_dir(fp);
        fs::create_dir_all(&configs).map_err(|e| RepositoryError::io(&configs, e))?;
        let mut highest = mapping.iter().map(|(id, _)| id.get()).max().unwrap_or(0);
        for entry in fs::read_dir(&configs).map_err(|e| RepositoryError::io(&configs, e))? {
            let entry = entry.map_err(|e| RepositoryError::io(&configs, e))?;
            if let Ok(id) = entry.file_name().to_string_lossy().parse::<InstanceId>() {
                highest = highest.max(id.get());
            }
        }
        let mut id = InstanceId::new(highest).next();
        loop {
            let dir = self.layout.config_dir(fp, id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok(id),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    tracing::debug!(instance = %id, "instance id taken, trying next");
                    id = id.next();
                }
                Err(e) => return Err(RepositoryError::io(dir, e)),
            }
        }
    }

    /// Store a new (policy, log) pairing under `fp`.
    ///
    /// Resubmitting the same owner, structure and log returns the existing
    /// instance without writing anything. Algorithms are resolved and the
    /// program generated in memory before any write, so a rejected
    /// submission leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns `MissingAlgorithm`, `Generation` or storage errors
    pub fn create_instance(
        &self,
        fp: &Fingerprint,
        doc: &PolicyDocument,
        policy_source: &[u8],
        log: &[u8],
        log_file: &str,
    ) -> RepositoryResult<CreatedInstance> {
        if !is_plain_file_name(log_file) {
            return Err(ParseError::InvalidValue {
                field: "object_id.fileName".to_string(),
                reason: format!("not a plain file name: {:?}", log_file),
            }
            .into());
        }
        let (resolved, program) = self.prepare_program(fp, doc)?;
        let log_hash = log_content_hash(log);
        let key = dedup_key(doc, fp, &log_hash);

        let created = self.with_fingerprint_lock(fp, || {
            let mapping_path = self.layout.mapping_path(fp);
            let mut mapping = Mapping::load(&mapping_path)?;
            if let Some(id) = mapping.find_by_dedup(&key) {
                tracing::debug!(fingerprint = %fp.short(), instance = %id, "duplicate submission");
                let log_file = mapping
                    .get(id)
                    .map_or(log_file, |entry| entry.log_file.as_str());
                return Ok(CreatedInstance {
                    instance_id: id,
                    fingerprint: *fp,
                    paths: self.paths(fp, id, log_file),
                    duplicate: true,
                    generated: false,
                });
            }

            let generated = self.ensure_generated_locked(fp, &resolved, &program)?;
            let id = self.allocate_id(fp, &mapping)?;
            let log_path = self.layout.log_path(fp, id, log_file);
            let written = self.write_instance(fp, id, doc, policy_source, log, &log_hash, &log_path);
            if let Err(e) = written {
                tracing::warn!(instance = %id, error = %e, "instance creation failed, rolling back");
                self.discard_instance(fp, id, &log_hash, &log_path);
                return Err(e);
            }

            mapping.insert(
                id,
                MappingEntry {
                    log_file: log_file.to_string(),
                    config_path: self.layout.relative(&self.layout.config_dir(fp, id)),
                    data_path: self.layout.relative(&self.layout.data_dir(fp, id)),
                    authorized_users: AuthorizedUsers::of(doc),
                    owner: doc.owner.clone(),
                    dedup_key: key.clone(),
                    log_hash,
                },
            );
            if let Err(e) = mapping.save(&mapping_path) {
                self.discard_instance(fp, id, &log_hash, &log_path);
                return Err(e);
            }
            tracing::info!(
                fingerprint = %fp.short(),
                instance = %id,
                owner = %doc.owner,
                generated,
                "instance created"
            );
            Ok(CreatedInstance {
                instance_id: id,
                fingerprint: *fp,
                paths: self.paths(fp, id, log_file),
                duplicate: false,
                generated,
            })
        })?;

        if !created.duplicate {
            self.audit.append(
                &StreamId::Resource(log_hash),
                AuditEntry::submission(&doc.owner).for_instance(*fp, created.instance_id),
            )?;
        }
        Ok(created)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_instance(
        &self,
        fp: &Fingerprint,
        id: InstanceId,
        doc: &PolicyDocument,
        policy_source: &[u8],
        log: &[u8],
        log_hash: &ContentHash,
        log_path: &Path,
    ) -> RepositoryResult<()> {
        durable::write_durable(&self.layout.policy_path(fp, id), policy_source)?;
        durable::write_json_atomic(&self.layout.config_path(fp, id), doc)?;
        let stored = self.blobs.put(log)?;
        debug_assert_eq!(&stored, log_hash);
        self.blobs.link(log_hash, log_path)?;
        for phase in Phase::ALL {
            AccessState::default().save(&self.layout.state_path(fp, id, phase))?;
        }
        Ok(())
    }

    fn discard_instance(&self, fp: &Fingerprint, id: InstanceId, log_hash: &ContentHash, log_path: &Path) {
        if let Err(e) = self.blobs.release(log_hash, log_path) {
            tracing::warn!(error = %e, "failed to release log during rollback");
        }
        for dir in [self.layout.data_dir(fp, id), self.layout.config_dir(fp, id)] {
            if let Err(e) = durable::remove_dir_idempotent(&dir) {
                tracing::warn!(error = %e, dir = %dir.display(), "failed to remove partial instance");
            }
        }
    }

    /// Load an instance for enforcement
    ///
    /// # Errors
    ///
    /// Returns `UnknownInstance` if the mapping has no such entry
    pub fn load_instance(&self, fp: &Fingerprint, id: InstanceId) -> RepositoryResult<StoredInstance> {
        let mapping = Mapping::load(&self.layout.mapping_path(fp))?;
        let entry = mapping
            .get(id)
            .cloned()
            .ok_or(RepositoryError::UnknownInstance {
                fingerprint: *fp,
                instance: id,
            })?;
        let config_path = self.layout.config_path(fp, id);
        let document = durable::read_json_opt::<PolicyDocument>(&config_path)
            .map_err(|e| RepositoryError::Corrupt {
                path: config_path.clone(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| RepositoryError::Corrupt {
                path: config_path.clone(),
                reason: "instance config missing".to_string(),
            })?;
        Ok(StoredInstance {
            fingerprint: *fp,
            id,
            document,
            entry,
        })
    }

    /// Raw policy source of an instance
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn policy_source(&self, fp: &Fingerprint, id: InstanceId) -> RepositoryResult<Vec<u8>> {
        let path = self.layout.policy_path(fp, id);
        fs::read(&path).map_err(|e| RepositoryError::io(path, e))
    }

    /// Append to an audit stream
    ///
    /// # Errors
    ///
    /// Returns error if the append fails
    pub fn append_audit(&self, stream: &StreamId, entry: AuditEntry) -> RepositoryResult<AuditRecord> {
        Ok(self.audit.append(stream, entry)?)
    }
}
