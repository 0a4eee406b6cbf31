// SPDX-License-Identifier: MIT OR Apache-2.0
//! Condensation buffer (component C4).
//!
//! A keyed multimap of buffered originals plus O(1) flush-readiness
//! summaries (total count, earliest arrival, largest batch). Protected by
//! a single latch per the concurrency model: `admit`, `flush_ready`,
//! `drain`, `clear`, and `buffered_count` all take it, but envelope
//! materialization happens after the latch is released.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use cnd_core::{BufferedMessage, Clock, CondensedEnvelope, Headers, Message, SimilarityKey};
use cnd_strategy::ComparisonStrategy;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

/// An admission decision produced by [`Buffer::should_admit`] and consumed
/// by [`Buffer::admit`].
///
/// This replaces a threadlocal parse-cache scratch slot with an explicit
/// handle: the content and computed key are captured once and carried by
/// value, so there is no staleness window to reason about.
pub struct Admission {
    content: String,
    key: SimilarityKey,
}

struct BufferState {
    sequences: BTreeMap<SimilarityKey, VecDeque<BufferedMessage>>,
    total_count: usize,
    earliest_arrival_ms: u64,
    largest_batch: usize,
}

impl BufferState {
    fn new() -> Self {
        Self {
            sequences: BTreeMap::new(),
            total_count: 0,
            earliest_arrival_ms: u64::MAX,
            largest_batch: 0,
        }
    }

    fn recompute_summaries(&mut self) {
        self.earliest_arrival_ms = self
            .sequences
            .values()
            .filter_map(|seq| seq.front().map(|m| m.arrived_at_ms))
            .min()
            .unwrap_or(u64::MAX);
        self.largest_batch = self.sequences.values().map(VecDeque::len).max().unwrap_or(0);
    }
}

/// The keyed condensation buffer.
pub struct Buffer {
    state: Mutex<BufferState>,
    strategy: Arc<dyn ComparisonStrategy>,
    clock: Arc<dyn Clock>,
    window_ms: u64,
    max_batch_size: usize,
    extract_fields: Vec<String>,
}

impl Buffer {
    /// Construct a buffer with the given strategy, clock, and thresholds.
    pub fn new(
        strategy: Arc<dyn ComparisonStrategy>,
        clock: Arc<dyn Clock>,
        window_ms: u64,
        max_batch_size: usize,
        extract_fields: Vec<String>,
    ) -> Self {
        Self {
            state: Mutex::new(BufferState::new()),
            strategy,
            clock,
            window_ms,
            max_batch_size,
            extract_fields,
        }
    }

    /// §4.4 `shouldAdmit`: decide whether `msg` is condensable, returning an
    /// [`Admission`] handle if so.
    ///
    /// Rejects messages with no textual body, content that does not look
    /// top-level structured, or (never, in this implementation, since
    /// comparison-key computation is infallible) a strategy error.
    pub fn should_admit(&self, msg: &dyn Message) -> Option<Admission> {
        let body = msg.body()?;
        if !cnd_canon::looks_structured(body) {
            return None;
        }
        let key = self.strategy.compute_comparison_key(body);
        Some(Admission {
            content: body.to_string(),
            key,
        })
    }

    /// §4.4 `admit`: append a [`BufferedMessage`] under the admission's key,
    /// updating the O(1) summaries.
    pub fn admit(&self, admission: Admission, headers: Headers) {
        let arrived_at_ms = self.clock.now_ms();
        let mut state = self.state.lock().expect("buffer lock poisoned");
        let seq = state.sequences.entry(admission.key).or_default();
        seq.push_back(BufferedMessage::new(headers, admission.content, arrived_at_ms));
        state.total_count += 1;
        state.earliest_arrival_ms = state.earliest_arrival_ms.min(arrived_at_ms);
        state.largest_batch = state.largest_batch.max(seq.len());
        tracing::debug!(target: "cnd.buffer", total = state.total_count, "message admitted");
    }

    /// §4.4 `flushDue`: O(1) check against the size and window thresholds.
    pub fn flush_due(&self) -> bool {
        let state = self.state.lock().expect("buffer lock poisoned");
        if state.total_count == 0 {
            return false;
        }
        if state.largest_batch >= self.max_batch_size {
            return true;
        }
        let now = self.clock.now_ms();
        now.saturating_sub(state.earliest_arrival_ms) >= self.window_ms
    }

    /// §4.4 `flushReady`: emit one envelope per sequence that has crossed
    /// its window or size threshold, removing it from the buffer.
    ///
    /// Summaries are recomputed over whatever remains after the pass.
    pub fn flush_ready(&self) -> Vec<CondensedEnvelope> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().expect("buffer lock poisoned");
        let ready_keys: Vec<SimilarityKey> = state
            .sequences
            .iter()
            .filter(|(_, seq)| {
                let head_age = seq.front().map(|m| now.saturating_sub(m.arrived_at_ms)).unwrap_or(0);
                seq.len() >= self.max_batch_size || head_age >= self.window_ms
            })
            .map(|(k, _)| k.clone())
            .collect();

        let mut envelopes = Vec::with_capacity(ready_keys.len());
        for key in ready_keys {
            if let Some(seq) = state.sequences.remove(&key) {
                state.total_count -= seq.len();
                envelopes.push(cnd_envelope::build_envelope(seq.into_iter().collect(), self.extract_fields.clone()));
            }
        }
        state.recompute_summaries();
        envelopes
    }

    /// Current total number of buffered originals across all keys.
    pub fn buffered_count(&self) -> usize {
        self.state.lock().expect("buffer lock poisoned").total_count
    }

    /// §4.4 `clear`: discard all buffered items without emitting.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("buffer lock poisoned");
        *state = BufferState::new();
    }

    /// §4.4 `drain`: flush every sequence regardless of readiness.
    pub fn drain(&self) -> Vec<CondensedEnvelope> {
        let mut state = self.state.lock().expect("buffer lock poisoned");
        let sequences = std::mem::take(&mut state.sequences);
        *state = BufferState::new();
        drop(state);
        sequences
            .into_values()
            .map(|seq| cnd_envelope::build_envelope(seq.into_iter().collect(), self.extract_fields.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnd_core::{ManualClock, OwnedMessage};
    use cnd_strategy::FieldExclusionStrategy;

    fn buffer(window_ms: u64, max_batch_size: usize, clock: Arc<ManualClock>) -> Buffer {
        Buffer::new(
            Arc::new(FieldExclusionStrategy::with_defaults()),
            clock,
            window_ms,
            max_batch_size,
            cnd_envelope::default_extract_fields(),
        )
    }

    #[test]
    fn rejects_non_structured_and_empty_body() {
        let clock = Arc::new(ManualClock::new());
        let buf = buffer(1000, 100, clock);
        let msg = OwnedMessage::with_body("not json");
        assert!(buf.should_admit(&msg).is_none());
        let empty = OwnedMessage::default();
        assert!(buf.should_admit(&empty).is_none());
    }

    #[test]
    fn admits_and_coalesces_by_key() {
        let clock = Arc::new(ManualClock::new());
        let buf = buffer(1000, 100, clock);
        for body in [r#"{"v":1,"timestamp":1}"#, r#"{"v":1,"timestamp":2}"#] {
            let msg = OwnedMessage::with_body(body);
            let admission = buf.should_admit(&msg).unwrap();
            buf.admit(admission, msg.headers.clone());
        }
        assert_eq!(buf.buffered_count(), 2);
    }

    #[test]
    fn flush_due_on_batch_full() {
        let clock = Arc::new(ManualClock::new());
        let buf = buffer(10_000, 2, clock);
        for _ in 0..2 {
            let msg = OwnedMessage::with_body(r#"{"x":1}"#);
            let admission = buf.should_admit(&msg).unwrap();
            buf.admit(admission, msg.headers.clone());
        }
        assert!(buf.flush_due());
        let envelopes = buf.flush_ready();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].count(), 2);
        assert_eq!(buf.buffered_count(), 0);
    }

    #[test]
    fn flush_due_on_window_elapsed() {
        let clock = Arc::new(ManualClock::new());
        let buf = buffer(1000, 100, clock.clone());
        let msg = OwnedMessage::with_body(r#"{"x":1}"#);
        let admission = buf.should_admit(&msg).unwrap();
        buf.admit(admission, msg.headers.clone());
        assert!(!buf.flush_due());
        clock.advance(1000);
        assert!(buf.flush_due());
    }

    #[test]
    fn drain_empties_regardless_of_readiness() {
        let clock = Arc::new(ManualClock::new());
        let buf = buffer(60_000, 100, clock);
        for _ in 0..3 {
            let msg = OwnedMessage::with_body(r#"{"x":1}"#);
            let admission = buf.should_admit(&msg).unwrap();
            buf.admit(admission, msg.headers.clone());
        }
        assert!(!buf.flush_due());
        let envelopes = buf.drain();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].count(), 3);
        assert_eq!(buf.buffered_count(), 0);
    }

    #[test]
    fn clear_discards_without_emitting() {
        let clock = Arc::new(ManualClock::new());
        let buf = buffer(60_000, 100, clock);
        let msg = OwnedMessage::with_body(r#"{"x":1}"#);
        let admission = buf.should_admit(&msg).unwrap();
        buf.admit(admission, msg.headers.clone());
        buf.clear();
        assert_eq!(buf.buffered_count(), 0);
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn flush_readiness_is_monotonic_until_flushed() {
        let clock = Arc::new(ManualClock::new());
        let buf = buffer(1000, 2, clock);
        for _ in 0..2 {
            let msg = OwnedMessage::with_body(r#"{"x":1}"#);
            let admission = buf.should_admit(&msg).unwrap();
            buf.admit(admission, msg.headers.clone());
        }
        assert!(buf.flush_due());
        // a further admission under a *different* key must not un-ready the first
        let msg = OwnedMessage::with_body(r#"{"x":2}"#);
        let admission = buf.should_admit(&msg).unwrap();
        buf.admit(admission, msg.headers.clone());
        assert!(buf.flush_due());
    }
}
