//! Canonical JSON.
//!
//! Object keys in byte order, compact separators. Used wherever bytes are
//! hashed: policy fingerprints and audit record chaining.

use crate::error::CoreResult;
use serde::Serialize;
use serde_json::Value;

/// Canonical form of a JSON value
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Serialize `value` and return its canonical form
///
/// # Errors
///
/// Returns error if `value` cannot be represented as JSON
pub fn to_canonical_json<T: Serialize>(value: &T) -> CoreResult<String> {
    Ok(canonical_json(&serde_json::to_value(value)?))
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
