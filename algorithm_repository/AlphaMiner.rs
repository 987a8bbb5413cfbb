//! Alpha miner footprint: ordering relations between activities.
//!
//! Emits one `a REL b` line per ordered pair seen in the log, where REL is
//! `>` (causal), `||` (parallel) or `#` (never adjacent).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Footprint relation between two activities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// `a` directly followed by `b`, never the reverse
    Causal,
    /// Both orders observed
    Parallel,
    /// Never adjacent
    Choice,
}

impl Relation {
    fn symbol(self) -> &'static str {
        match self {
            Self::Causal => ">",
            Self::Parallel => "||",
            Self::Choice => "#",
        }
    }
}

/// Footprint matrix over every activity pair
pub fn footprint(log: &ucon_runtime::EventLog) -> BTreeMap<(String, String), Relation> {
    let mut activities = BTreeSet::new();
    let mut follows = BTreeSet::new();
    for trace in &log.traces {
        let names: Vec<&str> = trace.activities().collect();
        activities.extend(names.iter().map(|n| n.to_string()));
        for pair in names.windows(2) {
            follows.insert((pair[0].to_string(), pair[1].to_string()));
        }
    }
    let mut relations = BTreeMap::new();
    for a in &activities {
        for b in &activities {
            let forward = follows.contains(&(a.clone(), b.clone()));
            let backward = follows.contains(&(b.clone(), a.clone()));
            let relation = match (forward, backward) {
                (true, true) => Relation::Parallel,
                (true, false) => Relation::Causal,
                _ => Relation::Choice,
            };
            relations.insert((a.clone(), b.clone()), relation);
        }
    }
    relations
}

/// Entry point linked into the trusted application
pub fn run(log: &ucon_runtime::EventLog) -> Result<Vec<u8>, String> {
    let relations = footprint(log);
    if relations.is_empty() {
        return Err("log has no events".to_string());
    }
    let mut out = String::new();
    for ((a, b), relation) in &relations {
        let _ = writeln!(out, "{} {} {}", a, relation.symbol(), b);
    }
    Ok(out.into_bytes())
}
