// SPDX-License-Identifier: MIT OR Apache-2.0
//! Statistics (§6): `{inputMessages, outputBatches}` as lock-free monotonic
//! counters.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters exposed when `enableMetrics` is set.
#[derive(Debug, Default)]
pub struct Stats {
    input_messages: AtomicU64,
    output_batches: AtomicU64,
}

/// A point-in-time snapshot of [`Stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Total messages observed by the send path.
    pub input_messages: u64,
    /// Total condensed envelopes emitted.
    pub output_batches: u64,
}

impl Stats {
    /// Construct zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one inbound message.
    pub fn record_input(&self) {
        self.input_messages.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` condensed envelopes emitted (typically 1 per flush).
    pub fn record_output_batches(&self, count: u64) {
        self.output_batches.fetch_add(count, Ordering::Relaxed);
    }

    /// Read-only snapshot of both counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            input_messages: self.input_messages.load(Ordering::Relaxed),
            output_batches: self.output_batches.load(Ordering::Relaxed),
        }
    }
}
