//! Enforcement engine.
//!
//! A [`TrustedApplication`] serves the four operations of one policy class.
//! Each request loads the instance config, takes the access-state locks of
//! the phases it touches (in phase order), runs the gate sequence, and
//! writes its audit records before returning. Deletion records precede the
//! denial that caused them.

use crate::algorithm::AlgorithmRegistry;
use crate::error::{Denial, EnforcementError, EnforcementResult};
use crate::gate::{Artifact, GateRequest, RequestState, Verdict, evaluate};
use crate::transform;
use crate::xes::EventLog;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use ucon_core::{FileLock, Fingerprint, InstanceId, KeyedLocks, fs as durable};
use ucon_log::{AuditEntry, StreamId};
use ucon_policy::{Phase, PolicyDocument, RuleProfile, is_identifier};
use ucon_storage::{AccessState, Repository, RepositoryError, StoredInstance};

/// Audit operation names
pub mod ops {
    /// Log read
    pub const ACCESS_LOG: &str = "access-log";
    /// Algorithm execution
    pub const RUN_ALGORITHM: &str = "run-algorithm";
    /// Output read
    pub const GET_OUTPUT: &str = "get-output";
    /// Policy read
    pub const GET_POLICY: &str = "get-policy";
    /// Log deletion
    pub const DELETE_LOG: &str = "delete-log";
    /// Output deletion
    pub const DELETE_OUTPUT: &str = "delete-output";
}

/// What a trusted application enforces, fixed at generation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementSpec {
    /// Policy class served
    pub fingerprint: Fingerprint,
    /// Algorithms linked into the program
    pub allowed_algorithms: Vec<String>,
    /// Optional rule blocks present in the class
    pub profile: RuleProfile,
}

impl EnforcementSpec {
    /// Derive from any document of the class
    #[must_use]
    pub fn from_document(fingerprint: Fingerprint, doc: &PolicyDocument) -> Self {
        Self {
            fingerprint,
            allowed_algorithms: doc.algorithms(),
            profile: RuleProfile::of(doc),
        }
    }
}

/// Who is asking, from where, about which instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Target instance
    pub instance_id: InstanceId,
    /// Requesting principal
    pub actor: String,
    /// Declared requester location
    pub location: String,
}

impl Request {
    /// Create a new request
    #[must_use]
    pub fn new(instance_id: InstanceId, actor: &str, location: &str) -> Self {
        Self {
            instance_id,
            actor: actor.to_string(),
            location: location.to_string(),
        }
    }
}

/// The four operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    /// Read the (transformed) log
    AccessLog,
    /// Run a permitted algorithm over the log
    RunAlgorithm {
        /// Algorithm name
        algorithm: String,
    },
    /// Read a stored algorithm output
    GetOutput {
        /// Algorithm name
        algorithm: String,
    },
    /// Read the policy source
    GetPolicy,
}

impl Operation {
    /// Audit operation name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccessLog => ops::ACCESS_LOG,
            Self::RunAlgorithm { .. } => ops::RUN_ALGORITHM,
            Self::GetOutput { .. } => ops::GET_OUTPUT,
            Self::GetPolicy => ops::GET_POLICY,
        }
    }

    /// Phase a granted request advances to, `None` for policy reads
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::AccessLog => Some(Phase::LogAccess),
            Self::RunAlgorithm { .. } => Some(Phase::Processing),
            Self::GetOutput { .. } => Some(Phase::OutputAccess),
            Self::GetPolicy => None,
        }
    }
}

/// A completed algorithm run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedOutput {
    /// Algorithm that ran
    pub algorithm: String,
    /// Stored output, relative to the repository root
    pub output_path: String,
    /// Output size in bytes
    pub size: usize,
}

/// A granted request's payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Log bytes, transformed when the policy asks for it
    Log(Vec<u8>),
    /// Algorithm run confirmation
    Processed(ProcessedOutput),
    /// Output bytes
    Output(Vec<u8>),
    /// Policy source bytes
    Policy(Vec<u8>),
}

/// The enforcement program for one policy class
#[derive(Debug)]
pub struct TrustedApplication {
    repo: Repository,
    spec: EnforcementSpec,
    registry: AlgorithmRegistry,
    locks: KeyedLocks,
}

impl TrustedApplication {
    /// Create a new trusted application over `repo`
    #[must_use]
    pub fn new(repo: Repository, spec: EnforcementSpec, registry: AlgorithmRegistry) -> Self {
        Self {
            repo,
            spec,
            registry,
            locks: KeyedLocks::new(),
        }
    }

    /// Backing repository
    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// What this program enforces
    #[must_use]
    pub fn spec(&self) -> &EnforcementSpec {
        &self.spec
    }

    /// Dispatch one operation
    ///
    /// # Errors
    ///
    /// Returns `EnforcementError::Denied` for refusals, other variants for
    /// failures
    pub fn handle(&self, request: &Request, operation: &Operation) -> EnforcementResult<Grant> {
        match operation {
            Operation::AccessLog => self.access_log(request).map(Grant::Log),
            Operation::RunAlgorithm { algorithm } => {
                self.run_algorithm(request, algorithm).map(Grant::Processed)
            }
            Operation::GetOutput { algorithm } => self.get_output(request, algorithm).map(Grant::Output),
            Operation::GetPolicy => self.get_policy(request).map(Grant::Policy),
        }
    }

    fn instance_stream(&self, id: InstanceId) -> StreamId {
        StreamId::Instance {
            fingerprint: self.spec.fingerprint,
            instance: id,
        }
    }

    fn audit(&self, instance: &StoredInstance, entry: AuditEntry) -> EnforcementResult<()> {
        let entry = entry.for_instance(instance.fingerprint, instance.id);
        self.repo
            .append_audit(&self.instance_stream(instance.id), entry.clone())?;
        self.repo
            .append_audit(&StreamId::Resource(instance.entry.log_hash), entry)?;
        Ok(())
    }

    fn deny<T>(
        &self,
        instance: &StoredInstance,
        operation: &str,
        request: &Request,
        denial: Denial,
    ) -> EnforcementResult<T> {
        self.audit(
            instance,
            AuditEntry::decision(operation, &request.actor, &request.location, false)
                .with_reason(denial.code()),
        )?;
        tracing::warn!(
            instance = %instance.id,
            operation,
            actor = %request.actor,
            reason = denial.code(),
            "request denied"
        );
        Err(denial.into())
    }

    fn allow(&self, instance: &StoredInstance, operation: &str, request: &Request) -> EnforcementResult<()> {
        self.audit(
            instance,
            AuditEntry::decision(operation, &request.actor, &request.location, true),
        )?;
        tracing::info!(
            instance = %instance.id,
            operation,
            actor = %request.actor,
            "request granted"
        );
        Ok(())
    }

    fn load(&self, request: &Request, operation: &str) -> EnforcementResult<StoredInstance> {
        match self.repo.load_instance(&self.spec.fingerprint, request.instance_id) {
            Ok(instance) => Ok(instance),
            Err(RepositoryError::UnknownInstance { .. }) => {
                let denial = Denial::UnknownInstance;
                self.repo.append_audit(
                    &self.instance_stream(request.instance_id),
                    AuditEntry::decision(operation, &request.actor, &request.location, false)
                        .with_reason(denial.code())
                        .for_instance(self.spec.fingerprint, request.instance_id),
                )?;
                tracing::warn!(instance = %request.instance_id, operation, "unknown instance");
                Err(denial.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn state_path(&self, id: InstanceId, phase: Phase) -> PathBuf {
        self.repo.layout().state_path(&self.spec.fingerprint, id, phase)
    }

    fn with_phases<T>(
        &self,
        id: InstanceId,
        phases: &[Phase],
        f: &mut dyn FnMut() -> EnforcementResult<T>,
    ) -> EnforcementResult<T> {
        let Some((phase, rest)) = phases.split_first() else {
            return f();
        };
        let path = self.state_path(id, *phase);
        let key = path.to_string_lossy().into_owned();
        self.locks.with_lock(&key, || {
            let _file = FileLock::acquire(path.with_extension("lock"))?;
            self.with_phases(id, rest, f)
        })
    }

    fn gate_request<'a>(&self, request: &'a Request) -> GateRequest<'a> {
        GateRequest {
            actor: &request.actor,
            location: &request.location,
            now: self.repo.clock().now(),
        }
    }

    fn log_path(&self, instance: &StoredInstance) -> PathBuf {
        self.repo
            .layout()
            .log_path(&instance.fingerprint, instance.id, &instance.entry.log_file)
    }

    fn delete_log(
        &self,
        instance: &StoredInstance,
        log_state: &mut AccessState,
        request: &Request,
        denial: &Denial,
    ) -> EnforcementResult<()> {
        self.repo
            .blobs()
            .release(&instance.entry.log_hash, &self.log_path(instance))?;
        log_state.mark_deleted();
        log_state.save(&self.state_path(instance.id, Phase::LogAccess))?;
        self.audit(
            instance,
            AuditEntry::deletion(ops::DELETE_LOG, &request.actor, &request.location, denial.code()),
        )?;
        tracing::info!(instance = %instance.id, reason = denial.code(), "log deleted");
        Ok(())
    }

    fn delete_outputs(
        &self,
        instance: &StoredInstance,
        output_state: &mut AccessState,
        request: &Request,
        denial: &Denial,
    ) -> EnforcementResult<()> {
        let dir = self.repo.layout().outputs_dir(&instance.fingerprint, instance.id);
        durable::remove_dir_idempotent(&dir)?;
        output_state.mark_deleted();
        output_state.save(&self.state_path(instance.id, Phase::OutputAccess))?;
        self.audit(
            instance,
            AuditEntry::deletion(ops::DELETE_OUTPUT, &request.actor, &request.location, denial.code()),
        )?;
        tracing::info!(instance = %instance.id, reason = denial.code(), "outputs deleted");
        Ok(())
    }

    fn read_log(&self, instance: &StoredInstance) -> EnforcementResult<Vec<u8>> {
        let path = self.log_path(instance);
        fs::read(&path).map_err(|e| RepositoryError::Io { path, source: e }.into())
    }

    fn parsed_log(&self, instance: &StoredInstance, bytes: &[u8]) -> EnforcementResult<EventLog> {
        let mut log = EventLog::parse(bytes)?;
        transform::apply(&mut log, &instance.document.log_usage_rules, &self.spec.profile);
        Ok(log)
    }

    /// Read the log under the log-access rules. Transforms are applied when
    /// the policy class has any; otherwise the stored bytes are returned.
    ///
    /// # Errors
    ///
    /// Returns `Denied` on a refused gate
    pub fn access_log(&self, request: &Request) -> EnforcementResult<Vec<u8>> {
        let op = ops::ACCESS_LOG;
        let instance = self.load(request, op)?;
        let gate = self.gate_request(request);
        let state_path = self.state_path(instance.id, Phase::LogAccess);
        let rules = instance.document.phase_rules(Phase::LogAccess);

        self.with_phases(instance.id, &[Phase::LogAccess], &mut || {
            let mut state = AccessState::load(&state_path)?;
            let artifact = if self.log_path(&instance).is_file() {
                Artifact::Present
            } else {
                Artifact::Deleted
            };
            match evaluate(&rules, &state, artifact, &gate) {
                Verdict::Grant => {
                    let raw = self.read_log(&instance)?;
                    let served = if self.spec.profile.transforms_log() {
                        self.parsed_log(&instance, &raw)?.to_xml()?
                    } else {
                        raw
                    };
                    state.record_access(gate.now);
                    state.save(&state_path)?;
                    self.allow(&instance, op, request)?;
                    Ok(served)
                }
                Verdict::Deny(denial) => self.deny(&instance, op, request, denial),
                Verdict::DeleteAndDeny(denial) => {
                    self.delete_log(&instance, &mut state, request, &denial)?;
                    self.deny(&instance, op, request, denial)
                }
            }
        })
    }

    fn permits(&self, instance: &StoredInstance, algorithm: &str) -> bool {
        self.spec.allowed_algorithms.iter().any(|a| a == algorithm)
            && instance.document.permits_algorithm(algorithm)
    }

    /// Run `algorithm` over the log under the processing rules and store its
    /// output. The algorithm must be permitted before any other check runs.
    ///
    /// # Errors
    ///
    /// Returns `Denied` on a refused gate, `AlgorithmFailed` if the algorithm
    /// reports an error
    pub fn run_algorithm(&self, request: &Request, algorithm: &str) -> EnforcementResult<ProcessedOutput> {
        let op = ops::RUN_ALGORITHM;
        let instance = self.load(request, op)?;
        if !self.permits(&instance, algorithm) {
            return self.deny(&instance, op, request, Denial::AlgorithmNotPermitted);
        }
        let run = self
            .registry
            .get(algorithm)
            .ok_or_else(|| EnforcementError::AlgorithmUnavailable(algorithm.to_string()))?;
        let gate = self.gate_request(request);
        let log_state_path = self.state_path(instance.id, Phase::LogAccess);
        let state_path = self.state_path(instance.id, Phase::Processing);
        let rules = instance.document.phase_rules(Phase::Processing);
        let layout = self.repo.layout();

        self.with_phases(instance.id, &[Phase::LogAccess, Phase::Processing], &mut || {
            let mut log_state = AccessState::load(&log_state_path)?;
            let mut state = AccessState::load(&state_path)?;
            let artifact = if log_state.deleted || !self.log_path(&instance).is_file() {
                Artifact::Deleted
            } else {
                Artifact::Present
            };
            match evaluate(&rules, &state, artifact, &gate) {
                Verdict::Grant => {
                    let raw = self.read_log(&instance)?;
                    let log = self.parsed_log(&instance, &raw)?;
                    let output = match run(&log) {
                        Ok(output) => output,
                        Err(message) => {
                            self.audit(
                                &instance,
                                AuditEntry::decision(op, &request.actor, &request.location, false)
                                    .with_reason("algorithm-failed"),
                            )?;
                            return Err(EnforcementError::AlgorithmFailed {
                                name: algorithm.to_string(),
                                message,
                            });
                        }
                    };
                    let path = layout.output_path(&instance.fingerprint, instance.id, algorithm);
                    durable::write_atomic(&path, &output)?;
                    state.record_access(gate.now);
                    state.save(&state_path)?;
                    self.allow(&instance, op, request)?;
                    Ok(ProcessedOutput {
                        algorithm: algorithm.to_string(),
                        output_path: layout.relative(&path),
                        size: output.len(),
                    })
                }
                Verdict::Deny(denial) => self.deny(&instance, op, request, denial),
                Verdict::DeleteAndDeny(denial) => {
                    self.delete_log(&instance, &mut log_state, request, &denial)?;
                    self.deny(&instance, op, request, denial)
                }
            }
        })
    }

    /// Read the stored output of `algorithm` under the output rules
    ///
    /// # Errors
    ///
    /// Returns `Denied` on a refused gate; `OutputUnavailable` when the
    /// algorithm never ran
    pub fn get_output(&self, request: &Request, algorithm: &str) -> EnforcementResult<Vec<u8>> {
        let op = ops::GET_OUTPUT;
        let instance = self.load(request, op)?;
        if !is_identifier(algorithm) {
            return self.deny(&instance, op, request, Denial::OutputUnavailable);
        }
        let gate = self.gate_request(request);
        let state_path = self.state_path(instance.id, Phase::OutputAccess);
        let rules = instance.document.phase_rules(Phase::OutputAccess);
        let path = self
            .repo
            .layout()
            .output_path(&instance.fingerprint, instance.id, algorithm);

        self.with_phases(instance.id, &[Phase::OutputAccess], &mut || {
            let mut state = AccessState::load(&state_path)?;
            let artifact = if path.is_file() {
                Artifact::Present
            } else {
                Artifact::Absent
            };
            match evaluate(&rules, &state, artifact, &gate) {
                Verdict::Grant => {
                    let bytes = fs::read(&path).map_err(|e| RepositoryError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    state.record_access(gate.now);
                    state.save(&state_path)?;
                    self.allow(&instance, op, request)?;
                    Ok(bytes)
                }
                Verdict::Deny(denial) => self.deny(&instance, op, request, denial),
                Verdict::DeleteAndDeny(denial) => {
                    self.delete_outputs(&instance, &mut state, request, &denial)?;
                    self.deny(&instance, op, request, denial)
                }
            }
        })
    }

    /// Read the policy source. Policy terms are public to requesters, so no
    /// gate applies; the read is still audited.
    ///
    /// # Errors
    ///
    /// Returns `Denied(UnknownInstance)` or a storage failure
    pub fn get_policy(&self, request: &Request) -> EnforcementResult<Vec<u8>> {
        let op = ops::GET_POLICY;
        let instance = self.load(request, op)?;
        let source = self.repo.policy_source(&instance.fingerprint, instance.id)?;
        self.allow(&instance, op, request)?;
        Ok(source)
    }

    /// Furthest state the instance has reached
    ///
    /// # Errors
    ///
    /// Returns error if a state file cannot be read
    pub fn state(&self, id: InstanceId) -> EnforcementResult<RequestState> {
        let load = |phase| AccessState::load(&self.state_path(id, phase));
        let log = load(Phase::LogAccess)?;
        if log.deleted {
            return Ok(RequestState::Expired);
        }
        let reached = [Phase::OutputAccess, Phase::Processing, Phase::LogAccess]
            .into_iter()
            .map(|phase| load(phase).map(|state| (phase, state)))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .find(|(_, state)| state.access_count > 0)
            .map_or(RequestState::Unchecked, |(phase, _)| RequestState::granted(phase));
        Ok(reached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xes::tests::SAMPLE;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;
    use ucon_core::FixedClock;
    use ucon_policy::{fingerprint, parse_policy};
    use ucon_storage::RepositoryConfig;

    fn first_event(log: &EventLog) -> Result<Vec<u8>, String> {
        log.traces
            .iter()
            .flat_map(|t| t.activities())
            .next()
            .map(|a| a.as_bytes().to_vec())
            .ok_or_else(|| "empty log".to_string())
    }

    fn failing(_: &EventLog) -> Result<Vec<u8>, String> {
        Err("diverged".to_string())
    }

    fn policy(log_rules: &str, output_rules: &str) -> String {
        format!(
            r#"
@prefix ucon: <http://example.org/ucon#> .
@prefix eventLog: <http://example.org/eventLog#> .
@prefix pmt: <http://example.org/pmt#> .
ucon:p a ucon:Authorization ;
    ucon:owner "alice" ;
    ucon:object_id [ eventLog:fileName "log.xes" ] ;
    ucon:logUsageRules [ {log_rules} ] ;
    ucon:outputRules [ {output_rules} ] ;
    ucon:processingRules [
        ucon:accessControlRules "pubk1" ;
        ucon:allowedTechniques (
            [ pmt:techniqueType pmt:AutomatedDiscovery ; pmt:algorithm pmt:HeuristicMiner ]
            [ pmt:techniqueType pmt:AutomatedDiscovery ; pmt:algorithm pmt:InductiveMiner ]
        )
    ] .
"#
        )
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        clock: Arc<FixedClock>,
        app: TrustedApplication,
        id: InstanceId,
    }

    fn fixture(log_rules: &str, output_rules: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("algorithm_repository");
        fs::create_dir_all(&source).unwrap();
        for name in ["HeuristicMiner", "InductiveMiner"] {
            fs::write(source.join(format!("{}.rs", name)), "// algorithm\n").unwrap();
        }
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()));
        let repo = Repository::with_clock(RepositoryConfig::new(dir.path()), clock.clone()).unwrap();

        let src = policy(log_rules, output_rules);
        let doc = parse_policy(src.as_bytes()).unwrap();
        let fp = fingerprint(&doc);
        let created = repo
            .create_instance(&fp, &doc, src.as_bytes(), SAMPLE.as_bytes(), "log.xes")
            .unwrap();

        let mut registry = AlgorithmRegistry::new();
        registry.register("HeuristicMiner", first_event);
        registry.register("InductiveMiner", failing);
        let app = TrustedApplication::new(repo, EnforcementSpec::from_document(fp, &doc), registry);
        Fixture {
            _dir: dir,
            clock,
            app,
            id: created.instance_id,
        }
    }

    fn denial<T: std::fmt::Debug>(result: EnforcementResult<T>) -> Denial {
        result.unwrap_err().denial().cloned().unwrap()
    }

    #[test]
    fn test_quota_then_expired() {
        let f = fixture(r#"ucon:maxAccessCount 2 ; ucon:accessControlRules "pubk1""#, "");
        let req = Request::new(f.id, "pubk1", "IT");
        assert_eq!(f.app.access_log(&req).unwrap(), SAMPLE.as_bytes());
        assert_eq!(f.app.state(f.id).unwrap(), RequestState::LogGranted);
        f.app.access_log(&req).unwrap();
        assert_eq!(denial(f.app.access_log(&req)), Denial::QuotaExceeded);
        let instance = f.app.repo.load_instance(&f.app.spec.fingerprint, f.id).unwrap();
        assert!(!f.app.log_path(&instance).exists());
        assert!(!f.app.repo.blobs().exists(&instance.entry.log_hash));
        assert_eq!(denial(f.app.access_log(&req)), Denial::Expired);
        assert_eq!(f.app.state(f.id).unwrap(), RequestState::Expired);

        let records = f
            .app
            .repository()
            .audit()
            .read(&f.app.instance_stream(f.id))
            .unwrap();
        let summary: Vec<_> = records
            .iter()
            .map(|r| (r.operation.as_str(), r.allowed, r.reason.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("access-log", true, None),
                ("access-log", true, None),
                ("delete-log", true, Some("quota-exceeded")),
                ("access-log", false, Some("quota-exceeded")),
                ("access-log", false, Some("expired")),
            ]
        );
    }

    #[test]
    fn test_expiration_deletes_even_with_quota_left() {
        let f = fixture(
            r#"ucon:maxAccessCount 10 ; ucon:logExpiration "2025-06-30T00:00:00Z""#,
            "",
        );
        let req = Request::new(f.id, "anyone", "IT");
        f.app.access_log(&req).unwrap();
        f.clock.advance(Duration::days(60));
        assert_eq!(denial(f.app.access_log(&req)), Denial::Expired);
        // Processing reads the same log
        assert_eq!(
            denial(f.app.run_algorithm(&Request::new(f.id, "pubk1", "IT"), "HeuristicMiner")),
            Denial::Expired
        );
    }

    #[test]
    fn test_identity_denial_is_audited_without_deletion() {
        let f = fixture(r#"ucon:accessControlRules "pubk1""#, "");
        let req = Request::new(f.id, "mallory", "IT");
        assert_eq!(denial(f.app.access_log(&req)), Denial::Unauthorized);
        // Owner is always added to a non-empty list
        f.app.access_log(&Request::new(f.id, "alice", "IT")).unwrap();
        let records = f.app.repository().audit().read(&f.app.instance_stream(f.id)).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].allowed);
    }

    #[test]
    fn test_semantic_transform_applied() {
        let f = fixture(
            r#"ucon:semanticLogConstraints [ ucon:mustInclude "A1" ; ucon:mustExclude "A18" ]"#,
            "",
        );
        let served = f.app.access_log(&Request::new(f.id, "pubk1", "IT")).unwrap();
        let log = EventLog::parse(&served).unwrap();
        assert_eq!(log.traces.len(), 1);
        assert_eq!(log.traces[0].value("concept:name"), Some("case1"));
    }

    #[test]
    fn test_run_algorithm_and_get_output() {
        let f = fixture("", r#"ucon:accessControlRules "pubk1" ; ucon:maxAccessCount 1"#);
        let req = Request::new(f.id, "pubk1", "IT");
        assert_eq!(denial(f.app.get_output(&req, "HeuristicMiner")), Denial::OutputUnavailable);

        let processed = f.app.run_algorithm(&req, "HeuristicMiner").unwrap();
        assert_eq!(processed.size, 2);
        assert!(processed.output_path.ends_with("outputs/01/HeuristicMiner.out"));
        assert_eq!(f.app.state(f.id).unwrap(), RequestState::Processed);

        assert_eq!(f.app.get_output(&req, "HeuristicMiner").unwrap(), b"A1");
        assert_eq!(f.app.state(f.id).unwrap(), RequestState::OutputGranted);
        assert_eq!(denial(f.app.get_output(&req, "HeuristicMiner")), Denial::QuotaExceeded);
        assert_eq!(denial(f.app.get_output(&req, "HeuristicMiner")), Denial::Expired);
        assert_eq!(denial(f.app.get_output(&req, "../../mapping")), Denial::OutputUnavailable);
    }

    #[test]
    fn test_algorithm_permission_checked_first() {
        let f = fixture("", "");
        // Not permitted, even for an unauthorized actor
        let stranger = Request::new(f.id, "mallory", "IT");
        assert_eq!(
            denial(f.app.run_algorithm(&stranger, "AlphaMiner")),
            Denial::AlgorithmNotPermitted
        );
        assert_eq!(
            denial(f.app.run_algorithm(&stranger, "HeuristicMiner")),
            Denial::Unauthorized
        );
        let err = f
            .app
            .run_algorithm(&Request::new(f.id, "pubk1", "IT"), "InductiveMiner")
            .unwrap_err();
        assert!(matches!(err, EnforcementError::AlgorithmFailed { .. }));
    }

    #[test]
    fn test_policy_and_unknown_instance() {
        let f = fixture("", "");
        let policy = f.app.get_policy(&Request::new(f.id, "anyone", "FR")).unwrap();
        assert!(String::from_utf8(policy).unwrap().contains("ucon:Authorization"));
        let missing = Request::new(InstanceId::new(42), "anyone", "FR");
        assert_eq!(denial(f.app.get_policy(&missing)), Denial::UnknownInstance);
        assert_eq!(
            f.app.handle(&missing, &Operation::AccessLog).unwrap_err().denial(),
            Some(&Denial::UnknownInstance)
        );
    }

    #[test]
    fn test_concurrent_requests_are_all_audited() {
        let f = fixture(r#"ucon:maxAccessCount 5"#, "");
        let app = Arc::new(f.app);
        let handles: Vec<_> = (0..12)
            .map(|i| {
                let app = Arc::clone(&app);
                let id = f.id;
                std::thread::spawn(move || {
                    app.access_log(&Request::new(id, &format!("actor{}", i), "IT"))
                        .is_ok()
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(granted, 5);

        let stream = app.instance_stream(f.id);
        let records = app.repository().audit().read(&stream).unwrap();
        let decisions = records.iter().filter(|r| r.operation == ops::ACCESS_LOG).count();
        assert_eq!(decisions, 12);
        assert_eq!(records.len(), 13);
        app.repository().audit().verify(&stream).unwrap();
    }

    #[test]
    fn test_operation_wire_format() {
        let op: Operation = serde_json::from_str(r#"{"operation":"run-algorithm","algorithm":"HeuristicMiner"}"#).unwrap();
        assert_eq!(op.name(), "run-algorithm");
        assert_eq!(op.phase(), Some(Phase::Processing));
        assert_eq!(
            serde_json::to_value(Operation::AccessLog).unwrap(),
            serde_json::json!({"operation": "access-log"})
        );
    }
}
