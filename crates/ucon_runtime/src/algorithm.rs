//! Algorithms linked into a trusted application.

use crate::xes::EventLog;
use std::collections::BTreeMap;
use std::fmt;

/// Signature every algorithm source exports as `run`
pub type AlgorithmFn = fn(&EventLog) -> Result<Vec<u8>, String>;

/// Name to implementation table, filled by generated `main`
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    algorithms: BTreeMap<String, AlgorithmFn>,
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.algorithms.keys()).finish()
    }
}

impl AlgorithmRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `run` under `name`, replacing any earlier entry
    pub fn register(&mut self, name: &str, run: AlgorithmFn) {
        self.algorithms.insert(name.to_string(), run);
    }

    /// Implementation for `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<AlgorithmFn> {
        self.algorithms.get(name).copied()
    }

    /// Registered names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.algorithms.keys().map(String::as_str)
    }
}
