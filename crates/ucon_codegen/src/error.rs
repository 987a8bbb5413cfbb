//! Generation errors.

use thiserror::Error;

/// Generation result
pub type GenerationResult<T> = Result<T, GenerationError>;

/// Code generation failures. A mismatch means the determinism invariant
/// was violated and is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// Nothing to register
    #[error("Cannot generate a program without algorithms")]
    NoAlgorithms,

    /// Name unusable as file and module name
    #[error("Algorithm name {0:?} is not an identifier")]
    InvalidAlgorithmName(String),

    /// Two algorithm names map to the same module
    #[error("Algorithms {first:?} and {second:?} map to the same module {module}")]
    ModuleCollision {
        /// First name
        first: String,
        /// Second name
        second: String,
        /// Shared module name
        module: String,
    },

    /// Runtime dependency spec is not a single-line inline table
    #[error("Invalid runtime dependency spec {0:?}")]
    InvalidDependency(String),

    /// Stored program differs from a fresh generation
    #[error("Generated file {file} differs from stored copy")]
    Mismatch {
        /// Offending file
        file: String,
    },
}
