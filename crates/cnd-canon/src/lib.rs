// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structured-content canonicalizer (component C1).
//!
//! Turns message content into a deterministic canonical form: top-level
//! excluded fields removed, object members recursively key-sorted, arrays
//! left in element order. Content that is not top-level structured (does
//! not start with `{` or `[`) is declared non-structured and used verbatim
//! as its own key — this check is a fast, non-parsing prefix scan.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde_json::Value;
use std::collections::BTreeSet;

/// Returns `true` if `content`'s first non-whitespace character is `{` or
/// `[`.
///
/// O(length of leading whitespace); never parses the remainder.
pub fn looks_structured(content: &str) -> bool {
    match content.trim_start().as_bytes().first() {
        Some(b'{') | Some(b'[') => true,
        _ => false,
    }
}

/// Compute the canonical key for `content` under the given top-level field
/// exclusion set.
///
/// Falls back to the raw content text whenever the content is not
/// top-level structured, or fails to parse — this function never panics
/// and never returns an error; the fallback *is* the defined behavior.
pub fn canonical_key(content: &str, exclude: &BTreeSet<String>) -> String {
    if !looks_structured(content) {
        return content.to_string();
    }
    match serde_json::from_str::<Value>(content) {
        Ok(value) => {
            let canonical = canonicalize_value(&value, Some(exclude));
            canonical.to_string()
        }
        Err(_) => content.to_string(),
    }
}

/// Recursively produce a canonical [`Value`]: object members are sorted by
/// key at every level; at the outermost level (when `exclude` is
/// `Some`), fields named in `exclude` are dropped first. Arrays preserve
/// element order. Scalars are returned unchanged.
pub fn canonicalize_value(value: &Value, exclude: Option<&BTreeSet<String>>) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                if let Some(ex) = exclude {
                    if ex.contains(key) {
                        continue;
                    }
                }
                let v = &map[key];
                // Exclusion only applies at the top level: pass `None`
                // down so nested occurrences of excluded names survive.
                sorted.insert(key.clone(), canonicalize_value(v, None));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| canonicalize_value(v, None)).collect())
        }
        other => other.clone(),
    }
}

/// Return the textual form of the top-level field named `name`, if
/// `content` parses as a top-level JSON object containing it.
///
/// Used to recover per-original scalars (notably numeric timestamps) at
/// envelope-building time. Returns `None` on any parse failure or if the
/// field is absent — never errors.
pub fn extract_field(content: &str, name: &str) -> Option<String> {
    if !looks_structured(content) {
        return None;
    }
    let value: Value = serde_json::from_str(content).ok()?;
    let obj = value.as_object()?;
    let field = obj.get(name)?;
    Some(match field {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
