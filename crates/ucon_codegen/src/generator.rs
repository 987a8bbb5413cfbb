//! Enforcement program generation.
//!
//! Output is a pure function of the fingerprint, the sorted algorithm set,
//! the rule profile and the runtime dependency spec. Concrete policy values
//! never reach generated source; they are read from per-instance config at
//! run time.

use crate::error::{GenerationError, GenerationResult};
use crate::template;
use std::collections::{BTreeMap, BTreeSet};
use ucon_core::{ContentHash, Fingerprint};
use ucon_policy::{RuleProfile, is_identifier};

/// Build descriptor file name
pub const MANIFEST_FILE: &str = "Cargo.toml";
/// Program entry point file name
pub const MAIN_FILE: &str = "main.rs";
/// Dependency spec used when none is configured
pub const DEFAULT_RUNTIME_DEPENDENCY: &str = "{ version = \"0.1\" }";

/// Everything generation depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInput {
    fingerprint: Fingerprint,
    algorithms: BTreeSet<String>,
    profile: RuleProfile,
    runtime_dependency: String,
}

impl GenerationInput {
    /// Create a new generation input. Algorithm order and duplicates are
    /// irrelevant.
    #[must_use]
    pub fn new(
        fingerprint: Fingerprint,
        algorithms: impl IntoIterator<Item = String>,
        profile: RuleProfile,
    ) -> Self {
        Self {
            fingerprint,
            algorithms: algorithms.into_iter().collect(),
            profile,
            runtime_dependency: DEFAULT_RUNTIME_DEPENDENCY.to_string(),
        }
    }

    /// Use a different `ucon_runtime` dependency spec
    #[must_use]
    pub fn with_runtime_dependency(mut self, spec: impl Into<String>) -> Self {
        self.runtime_dependency = spec.into();
        self
    }

    /// Policy class
    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Sorted algorithm names
    pub fn algorithms(&self) -> impl Iterator<Item = &str> {
        self.algorithms.iter().map(String::as_str)
    }

    /// Rule profile
    #[must_use]
    pub fn profile(&self) -> &RuleProfile {
        &self.profile
    }
}

/// One generated file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the fingerprint directory
    pub path: &'static str,
    /// File content
    pub contents: String,
}

/// A generated program: build descriptor plus entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedProgram {
    files: Vec<GeneratedFile>,
}

impl GeneratedProgram {
    /// Files in write order; the build descriptor comes last and marks the
    /// program as complete.
    #[must_use]
    pub fn files(&self) -> &[GeneratedFile] {
        &self.files
    }

    /// Content of the file at `path`
    #[must_use]
    pub fn file(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.contents.as_str())
    }

    /// Hash over every path and content
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        let mut bytes = Vec::new();
        for file in &self.files {
            bytes.extend_from_slice(file.path.as_bytes());
            bytes.push(0);
            bytes.extend_from_slice(file.contents.as_bytes());
            bytes.push(0);
        }
        ContentHash::compute(&bytes)
    }

    /// Compare against stored copies; `read` returns the stored bytes of a
    /// path, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Mismatch` naming the first differing or
    /// missing file
    pub fn verify_against(
        &self,
        mut read: impl FnMut(&str) -> Option<Vec<u8>>,
    ) -> GenerationResult<()> {
        for file in &self.files {
            match read(file.path) {
                Some(stored) if stored == file.contents.as_bytes() => {}
                _ => {
                    return Err(GenerationError::Mismatch {
                        file: file.path.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Generate the enforcement program for `input`
///
/// # Errors
///
/// Returns error on an empty or invalid algorithm set, a module name
/// collision, or a malformed dependency spec
pub fn generate(input: &GenerationInput) -> GenerationResult<GeneratedProgram> {
    if input.algorithms.is_empty() {
        return Err(GenerationError::NoAlgorithms);
    }
    let dependency = input.runtime_dependency.trim();
    if !(dependency.starts_with('{') && dependency.ends_with('}')) || dependency.contains('\n') {
        return Err(GenerationError::InvalidDependency(
            input.runtime_dependency.clone(),
        ));
    }

    let mut modules: BTreeMap<String, String> = BTreeMap::new();
    let mut algorithms = Vec::with_capacity(input.algorithms.len());
    for name in &input.algorithms {
        if !is_identifier(name) {
            return Err(GenerationError::InvalidAlgorithmName(name.clone()));
        }
        let module = template::module_name(name);
        if let Some(first) = modules.insert(module.clone(), name.clone()) {
            return Err(GenerationError::ModuleCollision {
                first,
                second: name.clone(),
                module,
            });
        }
        algorithms.push((name.clone(), module));
    }

    let fingerprint = input.fingerprint.to_hex();
    let package = format!("ta-{}", input.fingerprint.short());
    let program = GeneratedProgram {
        files: vec![
            GeneratedFile {
                path: MAIN_FILE,
                contents: template::main_source(&fingerprint, &algorithms, &input.profile),
            },
            GeneratedFile {
                path: MANIFEST_FILE,
                contents: template::build_descriptor(&package, dependency),
            },
        ],
    };
    tracing::debug!(
        fingerprint = %input.fingerprint.short(),
        algorithms = algorithms.len(),
        digest = %program.digest(),
        "generated enforcement program"
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(algorithms: &[&str]) -> GenerationInput {
        GenerationInput::new(
            Fingerprint::of_canonical(b"shape"),
            algorithms.iter().map(|a| a.to_string()),
            RuleProfile::default(),
        )
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate(&input(&["HeuristicMiner", "AlphaMiner"])).unwrap();
        let b = generate(&input(&["AlphaMiner", "HeuristicMiner", "AlphaMiner"])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_files_and_package_name() {
        let program = generate(&input(&["HeuristicMiner"])).unwrap();
        let paths: Vec<_> = program.files().iter().map(|f| f.path).collect();
        assert_eq!(paths, vec![MAIN_FILE, MANIFEST_FILE]);
        let manifest = program.file(MANIFEST_FILE).unwrap();
        let short = Fingerprint::of_canonical(b"shape").short();
        assert!(manifest.contains(&format!("name = \"ta-{}\"", short)));
        let main = program.file(MAIN_FILE).unwrap();
        assert!(main.contains(&Fingerprint::of_canonical(b"shape").to_hex()));
    }

    #[test]
    fn test_profile_changes_output() {
        let plain = generate(&input(&["HeuristicMiner"])).unwrap();
        let profile = RuleProfile {
            semantic_constraints: true,
            ..RuleProfile::default()
        };
        let filtered = generate(&GenerationInput::new(
            Fingerprint::of_canonical(b"shape"),
            vec!["HeuristicMiner".to_string()],
            profile,
        ))
        .unwrap();
        assert_ne!(plain.digest(), filtered.digest());
        assert!(filtered.file(MAIN_FILE).unwrap().contains("semantic_constraints: true"));
    }

    #[test]
    fn test_runtime_dependency() {
        let program = generate(
            &input(&["HeuristicMiner"]).with_runtime_dependency("{ path = \"/opt/ucon/crates/ucon_runtime\" }"),
        )
        .unwrap();
        assert!(program
            .file(MANIFEST_FILE)
            .unwrap()
            .contains("ucon_runtime = { path = \"/opt/ucon/crates/ucon_runtime\" }"));

        let err = generate(&input(&["HeuristicMiner"]).with_runtime_dependency("0.1\n[evil]")).unwrap_err();
        assert!(matches!(err, GenerationError::InvalidDependency(_)));
    }

    #[test]
    fn test_rejects_bad_algorithm_sets() {
        assert_eq!(generate(&input(&[])).unwrap_err(), GenerationError::NoAlgorithms);
        assert!(matches!(
            generate(&input(&["../x"])).unwrap_err(),
            GenerationError::InvalidAlgorithmName(_)
        ));
        assert!(matches!(
            generate(&input(&["FooBar", "Foo_bar"])).unwrap_err(),
            GenerationError::ModuleCollision { .. }
        ));
    }

    #[test]
    fn test_verify_against() {
        let program = generate(&input(&["HeuristicMiner"])).unwrap();
        let stored: Vec<(String, Vec<u8>)> = program
            .files()
            .iter()
            .map(|f| (f.path.to_string(), f.contents.clone().into_bytes()))
            .collect();
        let lookup = |path: &str| {
            stored
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, b)| b.clone())
        };
        program.verify_against(lookup).unwrap();

        let err = program
            .verify_against(|path| (path == MAIN_FILE).then(|| b"tampered".to_vec()))
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::Mismatch {
                file: MAIN_FILE.to_string()
            }
        );
    }
}
