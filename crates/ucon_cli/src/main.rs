//! UCON.FABRIC CLI
//!
//! Operator interface to a trusted-application repository: compute policy
//! fingerprints, submit policy and log pairs, inspect generated programs,
//! read and verify audit streams, and issue the enforcement operations that
//! need no linked algorithm.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use ucon_core::{ContentHash, Fingerprint, InstanceId};
use ucon_log::StreamId;
use ucon_policy::{RuleProfile, fingerprint, parse_policy};
use ucon_runtime::host::{self, EXIT_DENIED};
use ucon_runtime::{
    AlgorithmRegistry, EnforcementError, EnforcementSpec, Operation, Request, TrustedApplication,
};
use ucon_storage::{Repository, RepositoryConfig, RepositoryError, submit};

#[derive(Parser)]
#[command(name = "ucon")]
#[command(about = "UCON.FABRIC - usage-control policy compiler and trusted-application repository", long_about = None)]
struct Cli {
    /// Repository configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Repository root, overrides the configuration
    #[arg(long, global = true, env = "UCON_ROOT")]
    root: Option<PathBuf>,
    /// Algorithm source directory, overrides the configuration
    #[arg(long, global = true)]
    algorithms: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Target {
    /// Policy class
    #[arg(short, long)]
    fingerprint: Fingerprint,
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

#[derive(Subcommand)]
enum Commands {
    /// Print the structural fingerprint of a policy
    Fingerprint {
        /// Policy file (Turtle)
        #[arg(short, long)]
        policy: PathBuf,
    },
    /// Submit a policy and event log
    Submit {
        /// Policy file (Turtle)
        #[arg(short, long)]
        policy: PathBuf,
        /// Event log file (XES)
        #[arg(short, long)]
        log: PathBuf,
    },
    /// Check whether a program exists for a fingerprint
    Lookup {
        /// Policy class
        #[arg(short, long)]
        fingerprint: Fingerprint,
    },
    /// Show a program's algorithms and instances
    Inspect {
        /// Policy class
        #[arg(short, long)]
        fingerprint: Fingerprint,
    },
    /// Print an audit stream
    Audit {
        /// Resource stream by log content hash
        #[arg(long, conflicts_with_all = ["fingerprint", "instance"])]
        resource: Option<String>,
        /// Instance stream: policy class
        #[arg(long, requires = "instance")]
        fingerprint: Option<Fingerprint>,
        /// Instance stream: instance id
        #[arg(long, requires = "fingerprint")]
        instance: Option<InstanceId>,
        /// Verify the hash chain instead of printing records
        #[arg(long)]
        verify: bool,
    },
    /// Read an instance's event log
    AccessLog(Target),
    /// Read a stored algorithm output
    GetOutput {
        #[command(flatten)]
        target: Target,
        /// Algorithm name
        #[arg(long)]
        algorithm: String,
    },
    /// Read an instance's policy
    GetPolicy(Target),
}

fn repository_config(cli: &Cli) -> Result<RepositoryConfig> {
    let mut config = match &cli.config {
        Some(path) => RepositoryConfig::load(path)?,
        None => RepositoryConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(dir) = &cli.algorithms {
        config.algorithm_source = Some(dir.clone());
    }
    Ok(config)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn audit_stream(
    resource: Option<String>,
    fingerprint: Option<Fingerprint>,
    instance: Option<InstanceId>,
) -> Result<StreamId> {
    match (resource, fingerprint, instance) {
        (Some(hex), None, None) => Ok(StreamId::Resource(ContentHash::from_hex(&hex)?)),
        (None, Some(fingerprint), Some(instance)) => Ok(StreamId::Instance {
            fingerprint,
            instance,
        }),
        _ => Err(eyre!("pass --resource, or --fingerprint with --instance")),
    }
}

/// Enforcement front end for one instance. Algorithm code is linked only
/// into generated programs, so the registry stays empty here.
fn application(repo: Repository, fp: Fingerprint, id: InstanceId) -> Result<TrustedApplication> {
    let spec = match repo.load_instance(&fp, id) {
        Ok(instance) => EnforcementSpec::from_document(fp, &instance.document),
        Err(RepositoryError::UnknownInstance { .. }) => EnforcementSpec {
            fingerprint: fp,
            allowed_algorithms: Vec::new(),
            profile: RuleProfile::default(),
        },
        Err(e) => return Err(e.into()),
    };
    Ok(TrustedApplication::new(repo, spec, AlgorithmRegistry::new()))
}

fn enforce(repo: Repository, target: Target, operation: Operation) -> Result<ExitCode> {
    let app = application(repo, target.fingerprint, target.instance)?;
    let request = Request {
        instance_id: target.instance,
        actor: target.actor,
        location: target.location,
    };
    match app.handle(&request, &operation) {
        Ok(grant) => {
            let bytes = match grant {
                ucon_runtime::Grant::Log(bytes)
                | ucon_runtime::Grant::Output(bytes)
                | ucon_runtime::Grant::Policy(bytes) => bytes,
                ucon_runtime::Grant::Processed(done) => serde_json::to_vec_pretty(&done)?,
            };
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Err(EnforcementError::Denied(denial)) => {
            eprintln!("denied: {} ({})", denial.code(), denial);
            Ok(ExitCode::from(EXIT_DENIED))
        }
        Err(e) => Err(e.into()),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = repository_config(&cli)?;
    match cli.command {
        Commands::Fingerprint { policy } => {
            let doc = parse_policy(&read(&policy)?)?;
            let fp = fingerprint(&doc);
            print_json(&serde_json::json!({
                "fingerprint": fp.to_hex(),
                "algorithms": doc.algorithms(),
                "profile": RuleProfile::of(&doc),
            }))?;
        }
        Commands::Submit { policy, log } => {
            let repo = Repository::open(config)?;
            let policy = read(&policy)?;
            let log = read(&log)?;
            match submit(&repo, Some(&policy), Some(&log)) {
                Ok(response) => print_json(&response)?,
                Err(e) => {
                    tracing::error!(status = e.status(), error = %e, "submission rejected");
                    return Err(eyre!("submission rejected ({}): {}", e.status(), e));
                }
            }
        }
        Commands::Lookup { fingerprint } => {
            let repo = Repository::open(config)?;
            print_json(&repo.lookup(&fingerprint)?)?;
        }
        Commands::Inspect { fingerprint } => {
            let repo = Repository::open(config)?;
            print_json(&repo.inspect(&fingerprint)?)?;
        }
        Commands::Audit {
            resource,
            fingerprint,
            instance,
            verify,
        } => {
            let repo = Repository::open(config)?;
            let stream = audit_stream(resource, fingerprint, instance)?;
            if verify {
                let report = repo.audit().verify(&stream)?;
                println!("ok: {} records, head {}", report.records, report.head);
            } else {
                for record in repo.audit().read(&stream)? {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
        }
        Commands::AccessLog(target) => {
            return enforce(Repository::open(config)?, target, Operation::AccessLog);
        }
        Commands::GetOutput { target, algorithm } => {
            return enforce(
                Repository::open(config)?,
                target,
                Operation::GetOutput { algorithm },
            );
        }
        Commands::GetPolicy(target) => {
            return enforce(Repository::open(config)?, target, Operation::GetPolicy);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    host::init_logging();
    run(Cli::parse())
}
