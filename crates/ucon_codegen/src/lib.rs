//! UCON.FABRIC Code Generator
//!
//! Turns a policy class (fingerprint, algorithm set, rule profile) into the
//! source and build descriptor of its trusted application.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod generator;
pub mod template;

pub use error::{GenerationError, GenerationResult};
pub use generator::{
    DEFAULT_RUNTIME_DEPENDENCY, GeneratedFile, GeneratedProgram, GenerationInput, MAIN_FILE,
    MANIFEST_FILE, generate,
};
pub use template::module_name;
