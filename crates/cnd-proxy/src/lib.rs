// SPDX-License-Identifier: MIT OR Apache-2.0
//! Proxy send path (component C7).
//!
//! Orchestrates the criteria gate, the condensation branch, and the direct
//! pass-through branch; exposes a force-flush and a shutdown-drain. This is
//! the crate an application actually depends on for the send side.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use cnd_buffer::Buffer;
use cnd_config::ProxyConfig;
use cnd_core::{Clock, Headers, Message, MonotonicClock, OwnedMessage};
use cnd_core::{CONDENSED_COUNT_PROPERTY, CONDENSED_MARKER_PROPERTY, CONDENSED_TIMESTAMPS_PROPERTY};
use cnd_delegate::{DelegateError, DelegateProducer, DeliveryMode};
use cnd_error::{CndError, ErrorCode};
use cnd_scheduler::{FlushRoutine, Scheduler};
use cnd_strategy::ComparisonStrategy;
use cnd_telemetry::Stats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A send-criteria predicate: return `false` to block the send silently.
pub type Criterion = Arc<dyn Fn(&OwnedMessage) -> bool + Send + Sync>;

/// A completion-listener callback, invoked exactly once per `send` call
/// whether the message was blocked, condensed, or sent directly — this
/// preserves API symmetry with an upstream completion-listener overload.
pub type CompletionListener = Arc<dyn Fn(&OwnedMessage) + Send + Sync>;

struct ProxyFlusher {
    buffer: Arc<Buffer>,
    delegate: Arc<dyn DelegateProducer>,
    delivery_mode: DeliveryMode,
    priority: u8,
    ttl: Option<Duration>,
    stats: Arc<Stats>,
    enable_metrics: bool,
}

#[async_trait]
impl FlushRoutine for ProxyFlusher {
    async fn run_flush(&self) -> usize {
        let envelopes = self.buffer.flush_ready();
        send_envelopes(
            &self.delegate,
            envelopes,
            self.delivery_mode,
            self.priority,
            self.ttl,
            &self.stats,
            self.enable_metrics,
        )
        .await;
        self.buffer.buffered_count()
    }
}

/// Materialize and send each envelope, outside any lock. A delegate
/// failure is logged and the next envelope is still attempted — this is
/// the best-effort drain policy from the error-handling design, used for
/// both the scheduled flush pass and an explicit force-flush.
async fn send_envelopes(
    delegate: &Arc<dyn DelegateProducer>,
    mut envelopes: Vec<cnd_core::CondensedEnvelope>,
    delivery_mode: DeliveryMode,
    priority: u8,
    ttl: Option<Duration>,
    stats: &Stats,
    enable_metrics: bool,
) {
    for envelope in &mut envelopes {
        let count = envelope.count();
        let first_timestamp = envelope.first_timestamp;
        let body = envelope.content.materialize().to_string();

        let message = OwnedMessage::with_body(body)
            .with_property(CONDENSED_MARKER_PROPERTY, true)
            .with_property(CONDENSED_COUNT_PROPERTY, count as i64)
            .with_property(CONDENSED_TIMESTAMPS_PROPERTY, first_timestamp)
            .with_headers(Headers {
                timestamp: first_timestamp,
                ..Headers::default()
            });

        // A flushed envelope has no destination of its own — it always goes
        // out through the delegate's default-destination overload, the same
        // path the direct-send branch uses when the caller didn't name one.
        // Whether that destination exists is the delegate's problem to
        // report, not ours to silently swallow.
        match delegate.send_to_default(message, delivery_mode, priority, ttl).await {
            Ok(()) => {
                if enable_metrics {
                    stats.record_output_batches(1);
                }
            }
            Err(err) => {
                tracing::warn!(target: "cnd.proxy", error = %err, count, "delegate send failed during flush, continuing with remaining envelopes");
            }
        }
    }
}

/// The send-side condensation proxy.
pub struct CondensingProxy {
    config: ProxyConfig,
    buffer: Arc<Buffer>,
    scheduler: Scheduler<ProxyFlusher>,
    delegate: Arc<dyn DelegateProducer>,
    criteria: Vec<Criterion>,
    stats: Arc<Stats>,
    delivery_mode: DeliveryMode,
    priority: u8,
    ttl: Option<Duration>,
    closed: AtomicBool,
}

impl CondensingProxy {
    /// Build a proxy wrapping `delegate`, using `strategy` to compute
    /// similarity keys.
    pub fn new(config: ProxyConfig, delegate: Arc<dyn DelegateProducer>, strategy: Arc<dyn ComparisonStrategy>) -> Self {
        Self::with_clock(config, delegate, strategy, Arc::new(MonotonicClock::new()))
    }

    /// Build a proxy with an explicit [`Clock`], for deterministic tests.
    pub fn with_clock(
        config: ProxyConfig,
        delegate: Arc<dyn DelegateProducer>,
        strategy: Arc<dyn ComparisonStrategy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let buffer = Arc::new(Buffer::new(
            strategy,
            clock,
            config.window.as_millis() as u64,
            config.max_batch_size,
            config.timestamp_fields_extract.clone(),
        ));
        let stats = Arc::new(Stats::new());
        let flusher = Arc::new(ProxyFlusher {
            buffer: buffer.clone(),
            delegate: delegate.clone(),
            delivery_mode: DeliveryMode::default(),
            priority: 4,
            ttl: None,
            stats: stats.clone(),
            enable_metrics: config.enable_metrics,
        });
        let scheduler = Scheduler::new(flusher, config.flush_interval);
        Self {
            config,
            buffer,
            scheduler,
            delegate,
            criteria: Vec::new(),
            stats,
            delivery_mode: DeliveryMode::default(),
            priority: 4,
            ttl: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Register a send-criteria predicate. Predicates run in registration
    /// order; the first to return `false` blocks the send.
    pub fn add_criterion(&mut self, criterion: Criterion) {
        self.criteria.push(criterion);
    }

    /// Number of originals currently buffered, across all keys.
    pub fn buffered_count(&self) -> usize {
        self.buffer.buffered_count()
    }

    /// A snapshot of the `{inputMessages, outputBatches}` counters.
    pub fn stats(&self) -> cnd_telemetry::StatsSnapshot {
        self.stats.snapshot()
    }

    /// §4.7 `send`, without a completion listener.
    pub async fn send(&self, destination: Option<&str>, message: OwnedMessage) -> Result<(), CndError> {
        self.send_with_listener(destination, message, None).await
    }

    /// §4.7 `send`, invoking `on_complete` exactly once regardless of which
    /// branch handled the message (blocked, condensed, or sent directly).
    pub async fn send_with_listener(
        &self,
        destination: Option<&str>,
        message: OwnedMessage,
        on_complete: Option<CompletionListener>,
    ) -> Result<(), CndError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CndError::new(ErrorCode::Internal, "send called after close"));
        }

        if self.config.enable_metrics {
            self.stats.record_input();
        }

        // 1. Criteria gate.
        if self.config.criteria_enabled {
            for criterion in &self.criteria {
                if !criterion(&message) {
                    if let Some(cb) = &on_complete {
                        cb(&message);
                    }
                    return Ok(());
                }
            }
        }

        // 2. Condensation branch.
        if self.config.condenser_enabled {
            if let Some(admission) = self.buffer.should_admit(&message) {
                self.buffer.admit(admission, message.headers.clone());
                self.scheduler.arm().await;
                if let Some(cb) = &on_complete {
                    cb(&message);
                }
                return Ok(());
            }
        }

        // 3. Direct branch.
        let result = match self.delegate.default_destination() {
            Some(default) if destination.is_none() || destination == Some(default) => {
                self.delegate
                    .send_to_default(message.clone(), self.delivery_mode, self.priority, self.ttl)
                    .await
            }
            _ => match destination {
                Some(dest) => {
                    self.delegate
                        .send(dest, message.clone(), self.delivery_mode, self.priority, self.ttl)
                        .await
                }
                None => {
                    return Err(CndError::new(
                        ErrorCode::Internal,
                        "no destination given and delegate has no default",
                    ));
                }
            },
        };

        if let Some(cb) = &on_complete {
            cb(&message);
        }

        result.map_err(delegate_error_to_cnd)
    }

    /// §4.7 `flush`: drain the buffer regardless of readiness and
    /// best-effort send every resulting envelope.
    pub async fn flush(&self) {
        let envelopes = self.buffer.drain();
        send_envelopes(
            &self.delegate,
            envelopes,
            self.delivery_mode,
            self.priority,
            self.ttl,
            &self.stats,
            self.config.enable_metrics,
        )
        .await;
    }

    /// §4.7 `close`: force-flush, cooperatively tear down the scheduler,
    /// then close the delegate. Errors are logged, never propagated.
    pub async fn close(&self) {
        self.flush().await;
        if !self.scheduler.shutdown().await {
            tracing::warn!(target: "cnd.proxy", "scheduler shutdown timed out");
        }
        if let Err(err) = self.delegate.close().await {
            tracing::warn!(target: "cnd.proxy", error = %err, "delegate close failed during proxy close");
        }
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn delegate_error_to_cnd(err: DelegateError) -> CndError {
    CndError::new(ErrorCode::DelegateSendFailed, err.to_string()).with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnd_core::ManualClock;
    use cnd_delegate_mock::MockDelegate;
    use cnd_strategy::FieldExclusionStrategy;
    use serde_json::Value;

    fn proxy_with(config: ProxyConfig, clock: Arc<ManualClock>) -> (CondensingProxy, Arc<MockDelegate>) {
        let delegate = Arc::new(MockDelegate::with_default_destination("orders.out"));
        let strategy = Arc::new(FieldExclusionStrategy::with_defaults());
        let proxy = CondensingProxy::with_clock(config, delegate.clone(), strategy, clock);
        (proxy, delegate)
    }

    #[tokio::test]
    async fn baseline_pass_through_when_condenser_disabled() {
        let clock = Arc::new(ManualClock::new());
        let config = cnd_config::ProxyConfigBuilder::new().condenser_enabled(false).build();
        let (proxy, delegate) = proxy_with(config, clock);

        for _ in 0..3 {
            proxy.send(None, OwnedMessage::with_body(r#"{"a":1}"#)).await.unwrap();
        }

        let sent = delegate.sent().await;
        assert_eq!(sent.len(), 3);
        for s in &sent {
            assert_eq!(s.message.body.as_deref(), Some(r#"{"a":1}"#));
        }
    }

    #[tokio::test]
    async fn criterion_block_still_invokes_completion_listener() {
        let clock = Arc::new(ManualClock::new());
        let config = cnd_config::ProxyConfigBuilder::new().condenser_enabled(false).build();
        let (mut proxy, delegate) = proxy_with(config, clock);
        proxy.add_criterion(Arc::new(|m: &OwnedMessage| {
            m.property("priority").and_then(|p| match p {
                cnd_core::PropertyValue::Str(s) => Some(s == "high"),
                _ => None,
            }) == Some(true)
        }));

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called_clone = called.clone();
        let listener: CompletionListener = Arc::new(move |_m| {
            called_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        let low = OwnedMessage::with_body(r#"{"x":1}"#).with_property("priority", "low");
        proxy.send_with_listener(None, low, Some(listener)).await.unwrap();

        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
        assert!(delegate.sent().await.is_empty());
    }

    #[tokio::test]
    async fn batch_full_emits_before_window_expiry() {
        let clock = Arc::new(ManualClock::new());
        let config = cnd_config::ProxyConfigBuilder::new()
            .window(Duration::from_secs(10))
            .max_batch_size(2)
            .build();
        let (proxy, delegate) = proxy_with(config, clock);

        proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        proxy.flush().await;

        let sent = delegate.sent().await;
        assert_eq!(sent.len(), 1);
        let body: Value = serde_json::from_str(sent[0].message.body.as_ref().unwrap()).unwrap();
        assert_eq!(body[cnd_core::CONDENSED_META_FIELD]["count"], 2);
    }

    #[tokio::test]
    async fn close_drains_buffered_messages() {
        let clock = Arc::new(ManualClock::new());
        let config = cnd_config::ProxyConfigBuilder::new().window(Duration::from_secs(60)).build();
        let (proxy, delegate) = proxy_with(config, clock);

        for _ in 0..3 {
            proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        }
        assert_eq!(proxy.buffered_count(), 3);

        proxy.close().await;

        assert_eq!(proxy.buffered_count(), 0);
        assert_eq!(delegate.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn delegate_failure_on_flush_is_swallowed_and_logged() {
        let clock = Arc::new(ManualClock::new());
        let config = cnd_config::ProxyConfigBuilder::new().window(Duration::from_secs(60)).build();
        let (proxy, delegate) = proxy_with(config, clock);
        proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        delegate.fail_next_send().await;
        proxy.flush().await;
        assert_eq!(proxy.buffered_count(), 0);
        assert!(delegate.sent().await.is_empty());
    }

    #[tokio::test]
    async fn stats_stay_zero_when_metrics_disabled() {
        let clock = Arc::new(ManualClock::new());
        let config = cnd_config::ProxyConfigBuilder::new()
            .window(Duration::from_secs(10))
            .max_batch_size(2)
            .enable_metrics(false)
            .build();
        let (proxy, _delegate) = proxy_with(config, clock);

        proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        proxy.flush().await;

        let snapshot = proxy.stats();
        assert_eq!(snapshot.input_messages, 0);
        assert_eq!(snapshot.output_batches, 0);
    }

    #[tokio::test]
    async fn stats_record_when_metrics_enabled() {
        let clock = Arc::new(ManualClock::new());
        let config = cnd_config::ProxyConfigBuilder::new()
            .window(Duration::from_secs(10))
            .max_batch_size(2)
            .enable_metrics(true)
            .build();
        let (proxy, _delegate) = proxy_with(config, clock);

        proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        proxy.send(None, OwnedMessage::with_body(r#"{"x":1}"#)).await.unwrap();
        proxy.flush().await;

        let snapshot = proxy.stats();
        assert_eq!(snapshot.input_messages, 2);
        assert_eq!(snapshot.output_batches, 1);
    }
}
