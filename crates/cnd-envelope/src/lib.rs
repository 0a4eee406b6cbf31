// SPDX-License-Identifier: MIT OR Apache-2.0
//! Envelope builder (component C5).
//!
//! Given a batch of [`BufferedMessage`]s admitted under one similarity key,
//! produces a [`CondensedEnvelope`] whose aggregated body is computed
//! lazily — the actual serialization work only happens when
//! [`EnvelopeContent::materialize`] is called, which must happen outside
//! the condensation buffer's lock.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use cnd_core::{BufferedMessage, CondensedEnvelope, EnvelopeContent, OriginalMeta, CONDENSED_META_FIELD};
use serde_json::Value;

/// Field names whose values are extracted per-original into
/// `_condensedMeta.originalTimestamps`, in lookup priority order.
///
/// Distinct from (but overlapping with) the comparison strategy's exclusion
/// set: this set governs *recovery*, that one governs *matching*.
pub fn default_extract_fields() -> Vec<String> {
    [
        "timestamp",
        "time",
        "datetime",
        "ts",
        "createdAt",
        "created_at",
        "eventTime",
        "event_time",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Build a [`CondensedEnvelope`] from a batch of messages admitted under a
/// single similarity key.
///
/// `extract_fields` is consulted in order for each original: the first
/// present field whose value parses as a signed integer is recorded in the
/// envelope's `_condensedMeta.originalTimestamps`; all others are silently
/// skipped. The aggregated body itself is computed lazily (see
/// [`EnvelopeContent`]).
pub fn build_envelope(messages: Vec<BufferedMessage>, extract_fields: Vec<String>) -> CondensedEnvelope {
    assert!(!messages.is_empty(), "envelope must aggregate at least one original");

    let originals: Vec<OriginalMeta> = messages.iter().map(|m| OriginalMeta::from(&m.headers)).collect();
    let first_timestamp = messages.iter().map(|m| m.arrived_at_ms).min().unwrap_or(0) as i64;
    let last_timestamp = messages.iter().map(|m| m.arrived_at_ms).max().unwrap_or(0) as i64;

    let content = EnvelopeContent::Deferred(Box::new(move || materialize_body(&messages, &extract_fields)));

    CondensedEnvelope {
        content,
        originals,
        first_timestamp,
        last_timestamp,
    }
}

/// Parse the head content, strip the extraction fields, attach
/// `_condensedMeta`, and re-serialize.
///
/// Envelope materialization failure (non-object head, or a parse error) is
/// recovered locally: the head content is returned unchanged and a warning
/// is logged, matching the error-handling policy for "envelope
/// materialization failure."
fn materialize_body(messages: &[BufferedMessage], extract_fields: &[String]) -> String {
    let head = &messages[0].content;

    let mut value: Value = match serde_json::from_str(head) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(target: "cnd.envelope", error = %err, "envelope materialization failed, falling back to head content");
            return head.clone();
        }
    };

    let Some(obj) = value.as_object_mut() else {
        // Arrays and scalars: the builder only aggregates top-level
        // objects; non-objects pass through verbatim (see DESIGN.md for
        // the open-question decision this implements).
        tracing::debug!(target: "cnd.envelope", "head content is not a top-level object, emitting unchanged");
        return head.clone();
    };

    for field in extract_fields {
        obj.remove(field);
    }

    let mut numeric_timestamps = Vec::new();
    for msg in messages {
        if let Some(ts) = first_numeric_timestamp(&msg.content, extract_fields) {
            numeric_timestamps.push(ts);
        }
    }

    let mut meta = serde_json::Map::new();
    meta.insert("condensed".to_string(), Value::Bool(true));
    meta.insert("count".to_string(), Value::Number(messages.len().into()));
    if !numeric_timestamps.is_empty() {
        let first = *numeric_timestamps.iter().min().expect("non-empty");
        let last = *numeric_timestamps.iter().max().expect("non-empty");
        meta.insert(
            "originalTimestamps".to_string(),
            Value::Array(numeric_timestamps.into_iter().map(Value::from).collect()),
        );
        meta.insert("firstTimestamp".to_string(), Value::from(first));
        meta.insert("lastTimestamp".to_string(), Value::from(last));
    }
    obj.insert(CONDENSED_META_FIELD.to_string(), Value::Object(meta));

    value.to_string()
}

/// Read `content`'s top-level fields in `extract_fields` order, returning
/// the first one whose textual form parses as a signed 64-bit integer.
fn first_numeric_timestamp(content: &str, extract_fields: &[String]) -> Option<i64> {
    for field in extract_fields {
        if let Some(text) = cnd_canon::extract_field(content, field) {
            if let Ok(n) = text.parse::<i64>() {
                return Some(n);
            }
        }
    }
    None
}
