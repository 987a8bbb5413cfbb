//! Structured policy document.
//!
//! Each rule block is present or absent, each leaf a concrete value or a
//! nested record. The same types are persisted as the per-instance
//! `policy_config.json` and read back by the enforcement runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A parsed usage-control authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    /// The governed log object
    #[serde(rename = "object_id")]
    pub object_id: ObjectId,
    /// Rules for reading the log
    #[serde(default)]
    pub log_usage_rules: LogUsageRules,
    /// Rules for reading algorithm outputs
    #[serde(default)]
    pub output_rules: OutputRules,
    /// Rules for running algorithms over the log
    pub processing_rules: ProcessingRules,
    /// Principal that submitted the policy
    pub owner: String,
}

/// Log object metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectId {
    /// File name the log is stored under
    pub file_name: String,
    /// Declared format (e.g. `xes`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Log-access phase rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUsageRules {
    /// After this instant the log is deleted on next access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_expiration: Option<DateTime<Utc>>,
    /// Number of successful reads before the log is deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_access_count: Option<u64>,
    /// Permitted requester locations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_locations: Option<Vec<String>>,
    /// Permitted actors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_rules: Option<Vec<String>>,
    /// Event attributes stripped from served logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_exclusion_rules: Option<AttributeExclusionRules>,
    /// Events outside this range are dropped from served logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_time_range: Option<TimeRange>,
    /// Trace retention constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_log_constraints: Option<SemanticLogConstraints>,
}

/// Output-access phase rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRules {
    /// Permitted requester locations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_locations: Option<Vec<String>>,
    /// After this instant outputs are deleted on next access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_expiration: Option<DateTime<Utc>>,
    /// Permitted actors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_rules: Option<Vec<String>>,
    /// Access window for outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_time_range: Option<TimeRange>,
    /// Number of successful output reads before outputs are deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_access_count: Option<u64>,
}

/// Processing phase rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRules {
    /// Permitted actors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_rules: Option<Vec<String>>,
    /// Permitted requester locations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_locations: Option<Vec<String>>,
    /// Algorithms that may run over the log, never empty
    pub allowed_techniques: Vec<Technique>,
}

/// One permitted mining technique
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technique {
    /// Technique class, e.g. `AutomatedDiscovery`
    pub technique_type: String,
    /// Algorithm module name, e.g. `HeuristicMiner`
    pub algorithm: String,
}

/// Attribute exclusion block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeExclusionRules {
    /// Where exclusion applies (`event`)
    pub scope: String,
    /// Attribute the exclusion is keyed on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_attribute: Option<String>,
    /// Attribute keys removed from every event
    pub excluded_attributes: Vec<String>,
}

/// Closed interval over an event timestamp attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    /// Attribute holding the event time
    pub event_attribute: String,
    /// Inclusive start
    pub start_date: DateTime<Utc>,
    /// Inclusive end
    pub end_date: DateTime<Utc>,
}

impl TimeRange {
    /// Whether `instant` falls within the range
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start_date <= instant && instant <= self.end_date
    }
}

/// Trace retention constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticLogConstraints {
    /// Event attribute compared against the values
    pub event_attribute: String,
    /// Every value must be matched by some event of a retained trace
    #[serde(default)]
    pub must_include: Vec<String>,
    /// No event of a retained trace may match any of these
    #[serde(default)]
    pub must_exclude: Vec<String>,
}

impl PolicyDocument {
    /// Sorted, de-duplicated algorithm names
    #[must_use]
    pub fn algorithms(&self) -> Vec<String> {
        self.processing_rules
            .allowed_techniques
            .iter()
            .map(|t| t.algorithm.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Whether `algorithm` appears in `allowedTechniques`
    #[must_use]
    pub fn permits_algorithm(&self, algorithm: &str) -> bool {
        self.processing_rules
            .allowed_techniques
            .iter()
            .any(|t| t.algorithm == algorithm)
    }
}
