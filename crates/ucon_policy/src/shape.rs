//! Structural shape and fingerprinting.
//!
//! A policy's shape keeps its structure and algorithm names and forgets
//! every concrete value. Policies with the same shape share one generated
//! enforcement program; their concrete values live in per-instance config.

use crate::document::PolicyDocument;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ucon_core::{ContentHash, DedupKey, Fingerprint, canonical_json};

const TECHNIQUES_KEY: &str = "allowedTechniques";
const ALGORITHM_KEY: &str = "algorithm";

/// Type-tagged skeleton of a [`PolicyDocument`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralShape(Value);

impl StructuralShape {
    /// Derive the shape of a document
    #[must_use]
    pub fn of(doc: &PolicyDocument) -> Self {
        // Serializing plain data structs with string keys cannot fail
        let value = serde_json::to_value(doc).unwrap_or(Value::Null);
        Self(shape_value(&value))
    }

    /// Shape as a JSON value
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Canonical JSON: sorted keys, compact separators
    #[must_use]
    pub fn canonical_json(&self) -> String {
        canonical_json(&self.0)
    }

    /// SHA-256 of the canonical JSON
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_canonical(self.canonical_json().as_bytes())
    }
}

/// Fingerprint of a document's structural shape
#[must_use]
pub fn fingerprint(doc: &PolicyDocument) -> Fingerprint {
    StructuralShape::of(doc).fingerprint()
}

/// Content hash of raw log bytes
#[must_use]
pub fn log_content_hash(bytes: &[u8]) -> ContentHash {
    ContentHash::compute(bytes)
}

/// Deduplication key for a submission, scoped to the document owner
#[must_use]
pub fn dedup_key(doc: &PolicyDocument, fingerprint: &Fingerprint, log_hash: &ContentHash) -> DedupKey {
    DedupKey::new(&doc.owner, fingerprint, log_hash)
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn shape_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let shaped = if k == TECHNIQUES_KEY {
                        techniques_shape(v)
                    } else {
                        shape_value(v)
                    };
                    (k.clone(), shaped)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .first()
                .map(shape_value)
                .into_iter()
                .collect(),
        ),
        scalar => Value::String(type_tag(scalar).to_string()),
    }
}

/// Techniques keep their algorithm literally, one entry per distinct shape
fn techniques_shape(value: &Value) -> Value {
    let Value::Array(items) = value else {
        return shape_value(value);
    };
    let mut shaped: Vec<Value> = items
        .iter()
        .map(|item| match item {
            Value::Object(fields) => {
                let mut out = Map::new();
                for (k, v) in fields {
                    let field = if k == ALGORITHM_KEY {
                        v.clone()
                    } else {
                        shape_value(v)
                    };
                    out.insert(k.clone(), field);
                }
                Value::Object(out)
            }
            other => shape_value(other),
        })
        .collect();
    shaped.sort_by_cached_key(canonical_json);
    shaped.dedup();
    Value::Array(shaped)
}

/// Which optional rule blocks a policy carries.
///
/// The code generator branches on this and nothing else from the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleProfile {
    /// `logUsageRules.attributeExclusionRules` present
    pub attribute_exclusion: bool,
    /// `logUsageRules.allowedTimeRange` present
    pub log_time_range: bool,
    /// `logUsageRules.semanticLogConstraints` present
    pub semantic_constraints: bool,
    /// `outputRules.allowedTimeRange` present
    pub output_time_range: bool,
}

impl RuleProfile {
    /// Profile of a document
    #[must_use]
    pub fn of(doc: &PolicyDocument) -> Self {
        Self {
            attribute_exclusion: doc.log_usage_rules.attribute_exclusion_rules.is_some(),
            log_time_range: doc.log_usage_rules.allowed_time_range.is_some(),
            semantic_constraints: doc.log_usage_rules.semantic_log_constraints.is_some(),
            output_time_range: doc.output_rules.allowed_time_range.is_some(),
        }
    }

    /// Whether log reads need parsing and rewriting
    #[must_use]
    pub fn transforms_log(&self) -> bool {
        self.attribute_exclusion || self.log_time_range || self.semantic_constraints
    }
}
