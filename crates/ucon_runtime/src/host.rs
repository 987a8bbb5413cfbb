//! Process entry point for generated trusted applications.
//!
//! A generated `main` builds a [`ProgramSpec`] and hands control to [`run`].
//! The program either answers one request given on the command line or
//! serves JSON lines on stdin, one response line per request.

use crate::algorithm::AlgorithmRegistry;
use crate::engine::{EnforcementSpec, Grant, Operation, ProcessedOutput, Request, TrustedApplication};
use crate::error::{Denial, EnforcementError};
use crate::gate::RequestState;
use anyhow::Context;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use ucon_core::{Fingerprint, InstanceId};
use ucon_policy::RuleProfile;
use ucon_storage::{Repository, RepositoryConfig};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "UCON_LOG";

/// Exit status for a refused request
pub const EXIT_DENIED: u8 = 2;

/// Everything a generated program fixes at build time
#[derive(Debug)]
pub struct ProgramSpec {
    /// Policy class, hex
    pub fingerprint: &'static str,
    /// Algorithms linked into the program
    pub allowed_algorithms: &'static [&'static str],
    /// Optional rule blocks present in the class
    pub profile: RuleProfile,
    /// Directory of the generated build descriptor
    pub manifest_dir: &'static str,
    /// Linked algorithm implementations
    pub registry: AlgorithmRegistry,
}

impl ProgramSpec {
    /// Repository root the program was generated into
    #[must_use]
    pub fn default_root(&self) -> PathBuf {
        Path::new(self.manifest_dir).join("..").join("..")
    }
}

#[derive(Parser)]
#[command(name = "trusted-app")]
#[command(about = "UCON.FABRIC trusted application", long_about = None)]
struct Cli {
    /// Repository root (defaults to the one this program was generated into)
    #[arg(long, env = "UCON_ROOT")]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct RequestArgs {
    /// Instance id
    #[arg(short, long)]
    instance: InstanceId,
    /// Requesting principal
    #[arg(short, long)]
    actor: String,
    /// Requester location
    #[arg(short, long)]
    location: String,
}

impl RequestArgs {
    fn into_request(self) -> Request {
        Request {
            instance_id: self.instance,
            actor: self.actor,
            location: self.location,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Answer JSON-line requests on stdin
    Serve,
    /// Read the event log
    AccessLog(RequestArgs),
    /// Run a permitted algorithm
    RunAlgorithm {
        #[command(flatten)]
        request: RequestArgs,
        /// Algorithm name
        #[arg(long)]
        algorithm: String,
    },
    /// Read a stored algorithm output
    GetOutput {
        #[command(flatten)]
        request: RequestArgs,
        /// Algorithm name
        #[arg(long)]
        algorithm: String,
    },
    /// Read the policy
    GetPolicy(RequestArgs),
    /// Describe this program
    Info,
}

/// One request line in serve mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    /// Who and which instance
    #[serde(flatten)]
    pub request: Request,
    /// What
    #[serde(flatten)]
    pub operation: Operation,
}

/// Response body bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// `utf8` or `base64`
    pub encoding: String,
    /// Encoded bytes
    pub data: String,
}

impl Payload {
    /// Encode `bytes`, as text when they are valid UTF-8
    #[must_use]
    pub fn encode(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self {
                encoding: "utf8".to_string(),
                data: text.to_string(),
            },
            Err(_) => Self {
                encoding: "base64".to_string(),
                data: STANDARD.encode(bytes),
            },
        }
    }

    /// Recover the original bytes
    ///
    /// # Errors
    ///
    /// Returns error if base64 data is malformed or the encoding is unknown
    pub fn decode(&self) -> Result<Vec<u8>, String> {
        match self.encoding.as_str() {
            "utf8" => Ok(self.data.as_bytes().to_vec()),
            "base64" => STANDARD.decode(&self.data).map_err(|e| e.to_string()),
            other => Err(format!("unknown payload encoding {}", other)),
        }
    }
}

/// Reply to one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request was granted
    pub ok: bool,
    /// Instance state after the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RequestState>,
    /// Denial, when refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<Denial>,
    /// Human-readable failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Returned bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// Algorithm run confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<ProcessedOutput>,
}

impl Response {
    fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            state: None,
            denial: None,
            reason: Some(reason.into()),
            payload: None,
            processed: None,
        }
    }
}

/// Answer one request
#[must_use]
pub fn respond(app: &TrustedApplication, line: &RequestLine) -> Response {
    match app.handle(&line.request, &line.operation) {
        Ok(grant) => {
            let state = match line.operation.phase() {
                Some(phase) => Some(RequestState::granted(phase)),
                None => app.state(line.request.instance_id).ok(),
            };
            let (payload, processed) = match grant {
                Grant::Log(bytes) | Grant::Output(bytes) | Grant::Policy(bytes) => {
                    (Some(Payload::encode(&bytes)), None)
                }
                Grant::Processed(done) => (None, Some(done)),
            };
            Response {
                ok: true,
                state,
                denial: None,
                reason: None,
                payload,
                processed,
            }
        }
        Err(EnforcementError::Denied(denial)) => Response {
            ok: false,
            state: Some(RequestState::denied(&denial)),
            reason: Some(denial.to_string()),
            denial: Some(denial),
            payload: None,
            processed: None,
        },
        Err(e) => {
            tracing::error!(error = %e, operation = line.operation.name(), "request failed");
            Response::failure(e.to_string())
        }
    }
}

/// Parse and answer one serve-mode line
#[must_use]
pub fn respond_line(app: &TrustedApplication, line: &str) -> Response {
    match serde_json::from_str::<RequestLine>(line) {
        Ok(request) => respond(app, &request),
        Err(e) => Response::failure(format!("malformed request: {}", e)),
    }
}

/// Answer every line of `input` on `output`
///
/// # Errors
///
/// Returns error if reading or writing fails
pub fn serve(app: &TrustedApplication, input: impl BufRead, mut output: impl Write) -> io::Result<usize> {
    let mut answered = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = respond_line(app, &line);
        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
        answered += 1;
    }
    Ok(answered)
}

/// Install the stderr log subscriber, filtered by [`LOG_ENV`]
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn open(spec: &ProgramSpec, root: Option<PathBuf>) -> anyhow::Result<TrustedApplication> {
    let fingerprint: Fingerprint = spec
        .fingerprint
        .parse()
        .context("generated fingerprint is not valid hex")?;
    let root = root.unwrap_or_else(|| spec.default_root());
    let repo = Repository::open(RepositoryConfig::new(&root))
        .with_context(|| format!("opening repository at {}", root.display()))?;
    let enforcement = EnforcementSpec {
        fingerprint,
        allowed_algorithms: spec.allowed_algorithms.iter().map(|a| a.to_string()).collect(),
        profile: spec.profile,
    };
    Ok(TrustedApplication::new(repo, enforcement, spec.registry.clone()))
}

fn single(app: &TrustedApplication, line: RequestLine) -> ExitCode {
    let response = respond(app, &line);
    if let Some(payload) = response.payload.as_ref().and_then(|p| p.decode().ok()) {
        let mut stdout = io::stdout().lock();
        if stdout.write_all(&payload).and_then(|()| stdout.flush()).is_err() {
            return ExitCode::FAILURE;
        }
    } else if let Some(done) = &response.processed {
        println!("{} -> {} ({} bytes)", done.algorithm, done.output_path, done.size);
    }
    match (&response.denial, &response.reason) {
        (Some(denial), _) => {
            eprintln!("denied: {}", denial.code());
            ExitCode::from(EXIT_DENIED)
        }
        (None, Some(reason)) if !response.ok => {
            eprintln!("error: {}", reason);
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    }
}

/// Run a generated program
#[must_use]
pub fn run(spec: ProgramSpec) -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let app = match open(&spec, cli.root) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(fingerprint = spec.fingerprint, "trusted application started");

    let line = match cli.command {
        Command::Serve => {
            let stdin = io::stdin().lock();
            return match serve(&app, stdin, io::stdout().lock()) {
                Ok(answered) => {
                    tracing::info!(answered, "input closed");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            };
        }
        Command::Info => {
            let info = serde_json::json!({
                "fingerprint": spec.fingerprint,
                "allowedAlgorithms": spec.allowed_algorithms,
                "linkedAlgorithms": spec.registry.names().collect::<Vec<_>>(),
                "profile": spec.profile,
                "root": app.repository().layout().root(),
            });
            println!("{:#}", info);
            return ExitCode::SUCCESS;
        }
        Command::AccessLog(args) => RequestLine {
            request: args.into_request(),
            operation: Operation::AccessLog,
        },
        Command::RunAlgorithm { request, algorithm } => RequestLine {
            request: request.into_request(),
            operation: Operation::RunAlgorithm { algorithm },
        },
        Command::GetOutput { request, algorithm } => RequestLine {
            request: request.into_request(),
            operation: Operation::GetOutput { algorithm },
        },
        Command::GetPolicy(args) => RequestLine {
            request: args.into_request(),
            operation: Operation::GetPolicy,
        },
    };
    single(&app, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_wire_format() {
        let line: RequestLine = serde_json::from_str(
            r#"{"instanceId":"02","actor":"pubk1","location":"IT","operation":"get-output","algorithm":"HeuristicMiner"}"#,
        )
        .unwrap();
        assert_eq!(line.request.instance_id, InstanceId::new(2));
        assert_eq!(
            line.operation,
            Operation::GetOutput {
                algorithm: "HeuristicMiner".to_string()
            }
        );
        assert!(serde_json::from_str::<RequestLine>(r#"{"actor":"x","operation":"access-log"}"#).is_err());
    }

    #[test]
    fn test_payload_encoding() {
        let text = Payload::encode(b"<log/>");
        assert_eq!(text.encoding, "utf8");
        assert_eq!(text.decode().unwrap(), b"<log/>");

        let binary = Payload::encode(&[0xff, 0x00, 0xfe]);
        assert_eq!(binary.encoding, "base64");
        assert_eq!(binary.decode().unwrap(), vec![0xff, 0x00, 0xfe]);
    }

    #[test]
    fn test_denied_response_shape() {
        let response = Response {
            ok: false,
            state: Some(RequestState::denied(&Denial::QuotaExceeded)),
            reason: Some(Denial::QuotaExceeded.to_string()),
            denial: Some(Denial::QuotaExceeded),
            payload: None,
            processed: None,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({
                "ok": false,
                "state": "EXPIRED",
                "denial": "quota-exceeded",
                "reason": "access quota exceeded",
            })
        );
    }

    #[test]
    fn test_default_root_is_two_levels_up() {
        let spec = ProgramSpec {
            fingerprint: "00",
            allowed_algorithms: &[],
            profile: RuleProfile::default(),
            manifest_dir: "/srv/ucon/generated/abc",
            registry: AlgorithmRegistry::new(),
        };
        assert_eq!(spec.default_root(), Path::new("/srv/ucon/generated/abc/../.."));
    }
}
