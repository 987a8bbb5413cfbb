//! UCON.FABRIC Enforcement Runtime
//!
//! The library every generated trusted application links against: XES
//! handling, log transforms, the per-phase gate sequence, and the engine
//! that ties them to the repository and the audit log.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithm;
pub mod engine;
pub mod error;
pub mod gate;
pub mod host;
pub mod transform;
pub mod xes;

pub use algorithm::{AlgorithmFn, AlgorithmRegistry};
pub use engine::{EnforcementSpec, Grant, Operation, ProcessedOutput, Request, TrustedApplication};
pub use error::{Denial, EnforcementError, EnforcementResult, XesError};
pub use gate::RequestState;
pub use ucon_policy::RuleProfile;
pub use xes::{Attribute, Event, EventLog, Trace};
