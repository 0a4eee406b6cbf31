// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monotonic clock abstraction.
//!
//! The buffer's arrival timestamps and the scheduler's due-checks only ever
//! need a monotonic millisecond counter, never wall-clock time. Abstracting
//! it behind a trait lets tests drive time deterministically instead of
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of a monotonic millisecond timestamp.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since an arbitrary, clock-specific epoch.
    fn now_ms(&self) -> u64;
}

/// A [`Clock`] backed by [`std::time::Instant`], epoched at construction.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Create a clock epoched at the current instant.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A [`Clock`] whose value is set explicitly, for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current time.
    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Advance the current time by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(100);
        assert_eq!(clock.now_ms(), 100);
        clock.set(5);
        assert_eq!(clock.now_ms(), 5);
    }
}
