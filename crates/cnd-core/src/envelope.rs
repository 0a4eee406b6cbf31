// SPDX-License-Identifier: MIT OR Apache-2.0
//! Buffer and envelope data types shared by the condensation and
//! expansion engines.

use crate::message::Headers;
use std::sync::Arc;

/// An opaque similarity key: stable under "identical after canonicalization
/// with the configured exclusion set."
///
/// Two contents mapping to equal keys are eligible to be condensed into one
/// envelope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimilarityKey(Arc<str>);

impl SimilarityKey {
    /// Wrap a canonical-form string as a similarity key.
    pub fn new(canonical: impl Into<Arc<str>>) -> Self {
        Self(canonical.into())
    }

    /// Borrow the underlying canonical text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SimilarityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message admitted into the condensation buffer.
///
/// Lifecycle: created on admission, destroyed on flush or `clear`. Arrival
/// time is captured at admission, not at the original `send` call.
#[derive(Debug, Clone)]
pub struct BufferedMessage {
    /// Headers captured from the original message at admission time.
    pub headers: Headers,
    /// Textual content snapshot at admission time.
    pub content: String,
    /// Monotonic arrival timestamp, in milliseconds since an arbitrary epoch.
    pub arrived_at_ms: u64,
}

impl BufferedMessage {
    /// Construct a buffered message captured at `arrived_at_ms`.
    pub fn new(headers: Headers, content: impl Into<String>, arrived_at_ms: u64) -> Self {
        Self {
            headers,
            content: content.into(),
            arrived_at_ms,
        }
    }
}

/// Per-original metadata retained in a [`CondensedEnvelope`] so the
/// expansion engine can restore headers without re-deriving them.
#[derive(Debug, Clone)]
pub struct OriginalMeta {
    /// Original message identifier, if any.
    pub message_id: Option<String>,
    /// Original send timestamp, epoch milliseconds.
    pub timestamp: i64,
    /// Original correlation identifier, if any.
    pub correlation_id: Option<String>,
    /// Original priority, 0-9.
    pub priority: u8,
    /// Original expiration, epoch milliseconds, if any.
    pub expiration: Option<i64>,
    /// Original type tag, if any.
    pub type_tag: Option<String>,
}

impl From<&Headers> for OriginalMeta {
    fn from(h: &Headers) -> Self {
        Self {
            message_id: h.message_id.clone(),
            timestamp: h.timestamp,
            correlation_id: h.correlation_id.clone(),
            priority: h.priority,
            expiration: h.expiration,
            type_tag: h.type_tag.clone(),
        }
    }
}

/// A lazily-materialized aggregated body.
///
/// The send path must not evaluate this while holding the buffer latch;
/// `materialize` collapses `Deferred` to `Ready` exactly once.
pub enum EnvelopeContent {
    /// Already-computed textual body.
    Ready(String),
    /// A deferred computation producing the textual body. Not `Clone`;
    /// consumed by `materialize`.
    Deferred(Box<dyn FnOnce() -> String + Send>),
}

impl std::fmt::Debug for EnvelopeContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(s) => f.debug_tuple("Ready").field(s).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl EnvelopeContent {
    /// Collapse a `Deferred` producer into `Ready`, returning the text.
    ///
    /// Idempotent: calling this repeatedly on an already-`Ready` value is
    /// a cheap clone, never a second invocation of the producer closure.
    pub fn materialize(&mut self) -> &str {
        if let Self::Deferred(_) = self {
            let taken = std::mem::replace(self, Self::Ready(String::new()));
            if let Self::Deferred(f) = taken {
                *self = Self::Ready(f());
            }
        }
        match self {
            Self::Ready(s) => s.as_str(),
            Self::Deferred(_) => unreachable!("materialize always collapses to Ready"),
        }
    }
}

/// A batch of originals condensed under one similarity key, awaiting or
/// having been sent as a single outgoing message.
#[derive(Debug)]
pub struct CondensedEnvelope {
    /// The lazily-materialized aggregated body.
    pub content: EnvelopeContent,
    /// Per-original metadata, in admission order.
    pub originals: Vec<OriginalMeta>,
    /// Arrival timestamp of the first (earliest) original, epoch ms.
    pub first_timestamp: i64,
    /// Arrival timestamp of the last (latest) original, epoch ms.
    pub last_timestamp: i64,
}

impl CondensedEnvelope {
    /// Number of originals aggregated into this envelope.
    pub fn count(&self) -> usize {
        self.originals.len()
    }
}
