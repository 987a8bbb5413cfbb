//! Heuristic miner: dependency graph from directly-follows counts.
//!
//! Emits one `a -> b count dependency` line per directly-follows pair,
//! sorted by source then target. Dependency is
//! `(|a>b| - |b>a|) / (|a>b| + |b>a| + 1)`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Pairs below this dependency are left out of the graph
pub const DEPENDENCY_THRESHOLD: f64 = 0.5;

/// Directly-follows counts over every trace
pub fn directly_follows(log: &ucon_runtime::EventLog) -> BTreeMap<(String, String), u64> {
    let mut counts = BTreeMap::new();
    for trace in &log.traces {
        let activities: Vec<&str> = trace.activities().collect();
        for pair in activities.windows(2) {
            *counts
                .entry((pair[0].to_string(), pair[1].to_string()))
                .or_insert(0) += 1;
        }
    }
    counts
}

/// Entry point linked into the trusted application
pub fn run(log: &ucon_runtime::EventLog) -> Result<Vec<u8>, String> {
    if log.traces.is_empty() {
        return Err("log has no traces".to_string());
    }
    let counts = directly_follows(log);
    let mut out = String::new();
    for ((a, b), forward) in &counts {
        let backward = counts.get(&(b.clone(), a.clone())).copied().unwrap_or(0);
        let dependency = if a == b {
            *forward as f64 / (*forward as f64 + 1.0)
        } else {
            (*forward as f64 - backward as f64) / (*forward as f64 + backward as f64 + 1.0)
        };
        if dependency >= DEPENDENCY_THRESHOLD {
            let _ = writeln!(out, "{} -> {} {} {:.3}", a, b, forward, dependency);
        }
    }
    Ok(out.into_bytes())
}
