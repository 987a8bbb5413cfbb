//! Content transforms applied to granted log reads.
//!
//! Order: time-range event filter, semantic trace filter, attribute
//! exclusion. Each step runs only when the rule profile says the block
//! exists and the instance config carries it.

use crate::xes::{Event, EventLog, Trace};
use ucon_policy::{AttributeExclusionRules, LogUsageRules, RuleProfile, SemanticLogConstraints, TimeRange};

/// What a transform pass removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Events outside the time range
    pub events_dropped: usize,
    /// Traces removed by the semantic filter or emptied by the time filter
    pub traces_dropped: usize,
    /// Attribute occurrences stripped
    pub attributes_removed: usize,
}

/// Drop events whose time attribute lies outside `range`. Events without a
/// readable timestamp are kept; traces left empty are dropped.
pub fn filter_time_range(log: &mut EventLog, range: &TimeRange, stats: &mut TransformStats) {
    for trace in &mut log.traces {
        let before = trace.events.len();
        trace.events.retain(|event| {
            event
                .timestamp(&range.event_attribute)
                .is_none_or(|t| range.contains(t))
        });
        stats.events_dropped += before - trace.events.len();
    }
    let before = log.traces.len();
    log.traces.retain(|trace| !trace.events.is_empty());
    stats.traces_dropped += before - log.traces.len();
}

fn matches(event: &Event, attribute: &str, value: &str) -> bool {
    event.value(attribute) == Some(value)
}

/// Whether `trace` satisfies the constraints: some event matches one of
/// the `mustInclude` values (an empty list imposes nothing) and no event
/// matches a `mustExclude` value.
#[must_use]
pub fn retains(trace: &Trace, constraints: &SemanticLogConstraints) -> bool {
    let attribute = constraints.event_attribute.as_str();
    let hits = |values: &[String]| {
        trace
            .events
            .iter()
            .any(|e| values.iter().any(|value| matches(e, attribute, value)))
    };
    (constraints.must_include.is_empty() || hits(&constraints.must_include))
        && !hits(&constraints.must_exclude)
}

/// Drop traces that fail [`retains`]
pub fn filter_semantic(log: &mut EventLog, constraints: &SemanticLogConstraints, stats: &mut TransformStats) {
    let before = log.traces.len();
    log.traces.retain(|trace| retains(trace, constraints));
    stats.traces_dropped += before - log.traces.len();
}

/// Strip excluded attribute keys from every event, and from trace
/// attributes too when the scope is `trace`
pub fn exclude_attributes(log: &mut EventLog, rules: &AttributeExclusionRules, stats: &mut TransformStats) {
    let excluded = |key: &str| rules.excluded_attributes.iter().any(|k| k == key);
    let trace_scope = rules.scope.eq_ignore_ascii_case("trace");
    for trace in &mut log.traces {
        if trace_scope {
            let before = trace.attributes.len();
            trace.attributes.retain(|a| !excluded(&a.key));
            stats.attributes_removed += before - trace.attributes.len();
        }
        for event in &mut trace.events {
            let before = event.attributes.len();
            event.attributes.retain(|a| !excluded(&a.key));
            stats.attributes_removed += before - event.attributes.len();
        }
    }
}

/// Apply every transform the profile and rules call for
pub fn apply(log: &mut EventLog, rules: &LogUsageRules, profile: &RuleProfile) -> TransformStats {
    let mut stats = TransformStats::default();
    if let Some(range) = rules.allowed_time_range.as_ref().filter(|_| profile.log_time_range) {
        filter_time_range(log, range, &mut stats);
    }
    if let Some(constraints) = rules
        .semantic_log_constraints
        .as_ref()
        .filter(|_| profile.semantic_constraints)
    {
        filter_semantic(log, constraints, &mut stats);
    }
    if let Some(exclusion) = rules
        .attribute_exclusion_rules
        .as_ref()
        .filter(|_| profile.attribute_exclusion)
    {
        exclude_attributes(log, exclusion, &mut stats);
    }
    tracing::debug!(
        events_dropped = stats.events_dropped,
        traces_dropped = stats.traces_dropped,
        attributes_removed = stats.attributes_removed,
        "log transformed"
    );
    stats
}
