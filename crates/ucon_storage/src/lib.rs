//! UCON.FABRIC Trusted-Application Repository
//!
//! Durable, concurrency-safe storage of one generated enforcement program
//! plus N configuration instances per fingerprint, content-addressed log
//! artifacts, and the submission contract front ends call into.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod config;
pub mod error;
pub mod layout;
pub mod manifest;
pub mod mapping;
pub mod repository;
pub mod state;
pub mod submission;

pub use blob::BlobStore;
pub use config::RepositoryConfig;
pub use error::{RepositoryError, RepositoryResult};
pub use layout::Layout;
pub use manifest::{AlgorithmManifest, AlgorithmRecord};
pub use mapping::{Mapping, MappingEntry};
pub use repository::{CreatedInstance, InstancePaths, Inspection, Lookup, Repository, StoredInstance};
pub use state::AccessState;
pub use submission::{SubmissionError, SubmissionResponse, submit};
