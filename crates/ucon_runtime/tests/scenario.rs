//! End-to-end: submit a policy and log, then drive the trusted application
//! through quota exhaustion and deletion.

#[path = "../../../algorithm_repository/HeuristicMiner.rs"]
mod heuristic_miner;

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ucon_core::{FixedClock, InstanceId};
use ucon_log::StreamId;
use ucon_policy::parse_policy;
use ucon_runtime::host::{self, RequestLine, Response};
use ucon_runtime::{
    AlgorithmRegistry, Denial, EnforcementSpec, EventLog, Operation, Request, RequestState,
    TrustedApplication,
};
use ucon_storage::{Repository, RepositoryConfig, submit};

const POLICY: &str = r#"
@prefix ucon: <http://example.org/ucon#> .
@prefix eventLog: <http://example.org/eventLog#> .
@prefix pmt: <http://example.org/pmt#> .

ucon:policy1 a ucon:Authorization ;
    ucon:owner "hospital" ;
    ucon:object_id [ eventLog:fileName "sepsis.xes" ] ;
    ucon:logUsageRules [
        ucon:maxAccessCount 2 ;
        ucon:logExpiration "2030-01-01" ;
        ucon:accessControlRules "pubk1"
    ] ;
    ucon:processingRules [
        ucon:accessControlRules "pubk1" ;
        ucon:allowedTechniques (
            [ pmt:techniqueType pmt:AutomatedDiscovery ; pmt:algorithm pmt:HeuristicMiner ]
        )
    ] .
"#;

const LOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<log xes.version="1.0">
  <trace>
    <string key="concept:name" value="case1"/>
    <event><string key="concept:name" value="A1"/><date key="time:timestamp" value="2021-03-01T10:00:00+00:00"/></event>
    <event><string key="concept:name" value="A5"/><date key="time:timestamp" value="2021-03-01T11:00:00+00:00"/></event>
  </trace>
  <trace>
    <string key="concept:name" value="case2"/>
    <event><string key="concept:name" value="A1"/><date key="time:timestamp" value="2021-03-02T10:00:00+00:00"/></event>
    <event><string key="concept:name" value="A5"/><date key="time:timestamp" value="2021-03-02T11:00:00+00:00"/></event>
  </trace>
  <trace>
    <string key="concept:name" value="case3"/>
    <event><string key="concept:name" value="A2"/><date key="time:timestamp" value="2021-03-03T10:00:00+00:00"/></event>
  </trace>
</log>
"#;

fn setup(root: &Path) -> (TrustedApplication, InstanceId) {
    let algorithms = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../algorithm_repository");
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    let repo = Repository::with_clock(
        RepositoryConfig::new(root).with_algorithm_source(algorithms),
        clock,
    )
    .unwrap();

    let response = submit(&repo, Some(POLICY.as_bytes()), Some(LOG.as_bytes())).unwrap();
    assert_eq!(response.instance_id, InstanceId::FIRST);
    assert!(!response.duplicate);

    let doc = parse_policy(POLICY.as_bytes()).unwrap();
    let mut registry = AlgorithmRegistry::new();
    registry.register("HeuristicMiner", heuristic_miner::run);
    let spec = EnforcementSpec::from_document(response.fingerprint, &doc);
    (TrustedApplication::new(repo, spec, registry), response.instance_id)
}

fn denial<T: std::fmt::Debug>(result: ucon_runtime::EnforcementResult<T>) -> Denial {
    result.unwrap_err().denial().cloned().unwrap()
}

#[test]
fn test_quota_exhaustion_deletes_log() {
    let dir = tempfile::tempdir().unwrap();
    let (app, id) = setup(dir.path());
    let req = Request::new(id, "pubk1", "IT");

    let processed = app.run_algorithm(&req, "HeuristicMiner").unwrap();
    assert_eq!(processed.algorithm, "HeuristicMiner");
    assert_eq!(
        denial(app.run_algorithm(&req, "AlphaMiner")),
        Denial::AlgorithmNotPermitted
    );

    let first = app.access_log(&req).unwrap();
    assert_eq!(EventLog::parse(&first).unwrap().traces.len(), 3);
    app.access_log(&req).unwrap();
    assert_eq!(denial(app.access_log(&req)), Denial::QuotaExceeded);
    assert_eq!(denial(app.access_log(&req)), Denial::Expired);
    assert_eq!(app.state(id).unwrap(), RequestState::Expired);

    // Processing needs the log too
    assert_eq!(denial(app.run_algorithm(&req, "HeuristicMiner")), Denial::Expired);

    // The output survives the log
    let output = app.get_output(&req, "HeuristicMiner").unwrap();
    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("A1 -> A5 2 0.667"), "{}", text);

    let instance = app.repository().load_instance(&app.spec().fingerprint, id).unwrap();
    let audit = app.repository().audit();
    let instance_stream = StreamId::Instance {
        fingerprint: app.spec().fingerprint,
        instance: id,
    };
    let resource_stream = StreamId::Resource(instance.entry.log_hash);
    let records = audit.read(&instance_stream).unwrap();
    let operations: Vec<_> = records.iter().map(|r| r.operation.as_str()).collect();
    assert_eq!(
        operations,
        vec![
            "run-algorithm",
            "run-algorithm",
            "access-log",
            "access-log",
            "delete-log",
            "access-log",
            "access-log",
            "run-algorithm",
            "get-output",
        ]
    );
    assert_eq!(audit.verify(&instance_stream).unwrap().records, 9);
    // Submission plus every decision
    assert_eq!(audit.verify(&resource_stream).unwrap().records, 10);
    assert!(!app.repository().blobs().exists(&instance.entry.log_hash));
}

#[test]
fn test_unauthorized_actor_leaves_quota_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (app, id) = setup(dir.path());
    for _ in 0..5 {
        assert_eq!(
            denial(app.access_log(&Request::new(id, "mallory", "IT"))),
            Denial::Unauthorized
        );
    }
    // Owner is folded into the access list
    app.access_log(&Request::new(id, "hospital", "IT")).unwrap();
    assert_eq!(app.state(id).unwrap(), RequestState::LogGranted);
}

#[test]
fn test_serve_answers_every_line() {
    let dir = tempfile::tempdir().unwrap();
    let (app, id) = setup(dir.path());
    let lines = [
        serde_json::to_string(&RequestLine {
            request: Request::new(id, "pubk1", "IT"),
            operation: Operation::GetPolicy,
        })
        .unwrap(),
        String::new(),
        r#"{"instanceId":"01","actor":"pubk1","location":"IT","operation":"get-output","algorithm":"HeuristicMiner"}"#
            .to_string(),
        "not json".to_string(),
    ]
    .join("\n");

    let mut out = Vec::new();
    let answered = host::serve(&app, lines.as_bytes(), &mut out).unwrap();
    assert_eq!(answered, 3);

    let responses: Vec<Response> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert!(responses[0].ok);
    let policy = responses[0].payload.as_ref().unwrap().decode().unwrap();
    assert_eq!(policy, POLICY.as_bytes());

    assert!(!responses[1].ok);
    assert_eq!(responses[1].denial, Some(Denial::OutputUnavailable));
    assert_eq!(responses[1].state, Some(RequestState::Denied));

    assert!(!responses[2].ok);
    assert!(responses[2].reason.as_ref().unwrap().starts_with("malformed request"));
}
