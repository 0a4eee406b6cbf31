// SPDX-License-Identifier: MIT OR Apache-2.0
//! Receive-side expansion engine (component C8).
//!
//! Detects a condensed envelope on receive and reconstructs the N logical
//! messages it aggregates. Expansion never panics and never returns an
//! error: any failure to reconstruct falls back to a singleton list
//! containing the envelope message unchanged, matching the rest of this
//! codebase's "recover locally, log, continue" policy.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use cnd_core::{
    Headers, Message, OwnedMessage, PropertyValue, CONDENSED_COUNT_PROPERTY, CONDENSED_MARKER_PROPERTY,
    CONDENSED_META_FIELD, CONDENSED_TIMESTAMPS_PROPERTY,
};
use serde_json::Value;

/// The body field that a restored original's extracted timestamp is written
/// back to, absent a per-deployment override.
pub fn default_timestamp_restore_field() -> &'static str {
    "timestamp"
}

/// §4.8 `isCondensed`: cheap property check first, textual-sentinel fallback
/// second. Never panics.
pub fn is_condensed(msg: &dyn Message) -> bool {
    if let Some(marker) = msg.property(CONDENSED_MARKER_PROPERTY).and_then(PropertyValue::as_bool) {
        if marker {
            return true;
        }
    }

    let Some(body) = msg.body() else {
        return false;
    };
    if !body.contains(CONDENSED_META_FIELD) {
        return false;
    }
    matches!(
        parse_condensed_meta(body),
        Some(meta) if meta.get("condensed").and_then(Value::as_bool) == Some(true)
    )
}

/// §4.8 `expand`: reconstruct the N originals aggregated into a condensed
/// envelope, or `[msg]` unchanged if `msg` is not condensed or reconstruction
/// fails for any reason.
pub fn expand(msg: &OwnedMessage, timestamp_field: &str) -> Vec<OwnedMessage> {
    if !is_condensed(msg) {
        return vec![msg.clone()];
    }

    match try_expand(msg, timestamp_field) {
        Some(originals) => originals,
        None => {
            tracing::warn!(target: "cnd.expand", "expansion failed, delivering envelope unchanged");
            vec![msg.clone()]
        }
    }
}

fn try_expand(msg: &OwnedMessage, timestamp_field: &str) -> Option<Vec<OwnedMessage>> {
    let body = msg.body()?;
    let mut value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object_mut()?;
    let meta = obj.remove(CONDENSED_META_FIELD)?;
    let meta = meta.as_object()?;

    if meta.get("condensed").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let count = match meta.get("count") {
        Some(value) => value.as_u64()?.max(1) as usize,
        None => 1,
    };
    let timestamps: Vec<i64> = meta
        .get("originalTimestamps")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();

    let base = Value::Object(obj.clone());
    let inherited_properties: Vec<(String, PropertyValue)> = msg
        .properties()
        .iter()
        .filter(|(name, _)| !is_reserved_property(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let mut originals = Vec::with_capacity(count);
    for i in 0..count {
        let mut item = base.clone();
        let restored_timestamp = timestamps.get(i).copied();
        if let (Some(ts), Some(obj)) = (restored_timestamp, item.as_object_mut()) {
            obj.insert(timestamp_field.to_string(), Value::from(ts));
        }

        let mut headers = Headers {
            correlation_id: msg.headers.correlation_id.clone(),
            priority: msg.headers.priority,
            type_tag: msg.headers.type_tag.clone(),
            timestamp: msg.headers.timestamp,
            ..Headers::default()
        };
        if let Some(ts) = restored_timestamp {
            headers.timestamp = ts;
        }

        let mut built = OwnedMessage::with_body(item.to_string()).with_headers(headers);
        for (name, value) in &inherited_properties {
            built = built.with_property(name.clone(), value.clone());
        }
        originals.push(built);
    }

    Some(originals)
}

fn parse_condensed_meta(body: &str) -> Option<serde_json::Map<String, Value>> {
    let value: Value = serde_json::from_str(body).ok()?;
    let obj = value.as_object()?;
    let meta = obj.get(CONDENSED_META_FIELD)?.as_object()?.clone();
    Some(meta)
}

fn is_reserved_property(name: &str) -> bool {
    name == CONDENSED_MARKER_PROPERTY || name == CONDENSED_COUNT_PROPERTY || name == CONDENSED_TIMESTAMPS_PROPERTY
}
