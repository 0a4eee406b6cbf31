// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adaptive flush scheduler (component C6).
//!
//! A single background worker tied to the proxy. At most one flush task is
//! ever pending: arming is a compare-and-set on an atomic flag, so a burst
//! of admissions arms the scheduler exactly once. When the task fires it
//! runs a [`FlushRoutine`]; if work remains afterward it re-arms itself
//! with another one-shot delay, otherwise it goes idle. This is
//! deliberately not a fixed-rate poller — the whole point is to stop
//! ticking the moment there is nothing left to flush.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// How long [`Scheduler::shutdown`] waits for the in-flight task before
/// aborting it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The proxy's flush pass, invoked by the scheduler when a one-shot delay
/// elapses.
///
/// Returns the number of originals still buffered afterward, which is what
/// decides whether the scheduler re-arms.
#[async_trait]
pub trait FlushRoutine: Send + Sync {
    /// Run one flush pass, returning the buffered count afterward.
    async fn run_flush(&self) -> usize;
}

/// Self-rearming, self-suspending background flush scheduler.
pub struct Scheduler<R: FlushRoutine + 'static> {
    routine: Arc<R>,
    interval: Duration,
    armed: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl<R: FlushRoutine + 'static> Scheduler<R> {
    /// Build a scheduler that re-arms with `interval` between passes.
    pub fn new(routine: Arc<R>, interval: Duration) -> Self {
        Self {
            routine,
            interval,
            armed: Arc::new(AtomicBool::new(false)),
            stopping: Arc::new(AtomicBool::new(false)),
            handle: AsyncMutex::new(None),
        }
    }

    /// Arm the scheduler if it is not already pending.
    ///
    /// Idempotent: calling this from concurrent admissions never schedules
    /// more than one task.
    pub async fn arm(&self) {
        if self.stopping.load(Ordering::SeqCst) {
            return;
        }
        if self
            .armed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let routine = self.routine.clone();
        let interval = self.interval;
        let armed = self.armed.clone();
        let stopping = self.stopping.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                let remaining = routine.run_flush().await;
                tracing::debug!(target: "cnd.scheduler", remaining, "flush pass complete");
                if remaining == 0 || stopping.load(Ordering::SeqCst) {
                    break;
                }
                // Work remains: loop back for another one-shot delay
                // instead of polling at a fixed rate.
            }
            armed.store(false, Ordering::SeqCst);
        });

        *self.handle.lock().await = Some(task);
    }

    /// Whether a flush task is currently pending.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Cooperative shutdown: signal the worker to stop, wait up to
    /// [`SHUTDOWN_GRACE`], then abort if it hasn't exited.
    ///
    /// Returns `true` if the worker exited gracefully, `false` if it had to
    /// be aborted (a "shutdown timeout" per the error taxonomy).
    pub async fn shutdown(&self) -> bool {
        self.stopping.store(true, Ordering::SeqCst);
        let Some(task) = self.handle.lock().await.take() else {
            return true;
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
            Ok(_) => true,
            Err(_elapsed) => {
                tracing::warn!(target: "cnd.scheduler", "scheduler did not stop within grace period, aborting");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingRoutine {
        remaining: AtomicUsize,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl FlushRoutine for CountingRoutine {
        async fn run_flush(&self) -> usize {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.remaining.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn re_arms_while_work_remains_then_goes_idle() {
        let routine = Arc::new(CountingRoutine {
            remaining: AtomicUsize::new(2),
            runs: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(routine.clone(), Duration::from_millis(10));

        scheduler.arm().await;
        assert!(scheduler.is_armed());

        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        routine.remaining.store(0, Ordering::SeqCst);
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        assert!(!scheduler.is_armed());
        assert!(routine.runs.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn double_arm_does_not_schedule_twice() {
        let routine = Arc::new(CountingRoutine {
            remaining: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(routine, Duration::from_millis(50));
        scheduler.arm().await;
        scheduler.arm().await;
        assert!(scheduler.is_armed());
    }

    #[tokio::test]
    async fn shutdown_with_no_pending_task_is_immediate() {
        let routine = Arc::new(CountingRoutine {
            remaining: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(routine, Duration::from_millis(50));
        assert!(scheduler.shutdown().await);
    }
}
