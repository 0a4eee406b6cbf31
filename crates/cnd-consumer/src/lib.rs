// SPDX-License-Identifier: MIT OR Apache-2.0
//! Buffered consumer proxy (component C9).
//!
//! Adapts the N-messages-per-incoming-envelope pattern the expansion engine
//! (C8) produces onto a one-message-at-a-time consumer interface, via a
//! bounded FIFO queue of pre-expanded messages.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use cnd_core::OwnedMessage;
use cnd_delegate::{DelegateConsumer, DelegateError};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Default bounded-queue capacity (§6).
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Adapts a delegate consumer's single-message `receive` onto the expanded
/// N-to-1 burst a condensed envelope produces.
pub struct ExpandingConsumer {
    delegate: Arc<dyn DelegateConsumer>,
    queue: Mutex<VecDeque<OwnedMessage>>,
    capacity: usize,
    timestamp_field: String,
}

impl ExpandingConsumer {
    /// Build a consumer with the default queue capacity and timestamp field.
    pub fn new(delegate: Arc<dyn DelegateConsumer>) -> Self {
        Self::with_capacity(delegate, DEFAULT_QUEUE_CAPACITY)
    }

    /// Build a consumer with an explicit queue capacity.
    pub fn with_capacity(delegate: Arc<dyn DelegateConsumer>, capacity: usize) -> Self {
        Self {
            delegate,
            queue: Mutex::new(VecDeque::new()),
            capacity,
            timestamp_field: cnd_expand::default_timestamp_restore_field().to_string(),
        }
    }

    /// Number of pre-expanded messages currently queued.
    pub async fn queued_count(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// §4.9 pull-style `receive`: serve the internal queue first, otherwise
    /// pull and (if needed) expand one envelope from the delegate.
    ///
    /// `timeout` bounds only the underlying delegate `receive`; time spent
    /// expanding is not counted against it.
    pub async fn receive(&self, timeout: Option<Duration>) -> Result<Option<OwnedMessage>, DelegateError> {
        if let Some(head) = self.queue.lock().await.pop_front() {
            return Ok(Some(head));
        }

        let Some(msg) = self.delegate.receive(timeout).await? else {
            return Ok(None);
        };

        if !cnd_expand::is_condensed(&msg) {
            return Ok(Some(msg));
        }

        let mut originals = cnd_expand::expand(&msg, &self.timestamp_field).into_iter();
        let head = originals.next();
        self.enqueue_remaining(originals).await;
        Ok(head)
    }

    async fn enqueue_remaining(&self, rest: impl Iterator<Item = OwnedMessage>) {
        let mut queue = self.queue.lock().await;
        for item in rest {
            if queue.len() >= self.capacity {
                tracing::warn!(target: "cnd.consumer", capacity = self.capacity, "consumer queue full, dropping expanded item");
                continue;
            }
            queue.push_back(item);
        }
    }

    /// §4.9 push-style delivery: expand `msg` and invoke `listener` once per
    /// reconstructed original, in order. A listener panic for one item is
    /// caught and logged; it does not suppress delivery of the rest.
    pub fn deliver(&self, msg: OwnedMessage, listener: &(dyn Fn(OwnedMessage) + Send + Sync)) {
        for original in cnd_expand::expand(&msg, &self.timestamp_field) {
            let result = catch_unwind(AssertUnwindSafe(|| listener(original)));
            if result.is_err() {
                tracing::warn!(target: "cnd.consumer", "listener panicked on one expanded item, continuing with the rest");
            }
        }
    }

    /// §4.9 `close`: discard the queue and close the delegate.
    pub async fn close(&self) -> Result<(), DelegateError> {
        self.queue.lock().await.clear();
        self.delegate.close().await
    }
}

#[async_trait]
impl DelegateConsumer for ExpandingConsumer {
    async fn receive(&self, timeout: Option<Duration>) -> Result<Option<OwnedMessage>, DelegateError> {
        self.receive(timeout).await
    }

    async fn close(&self) -> Result<(), DelegateError> {
        self.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnd_core::{CONDENSED_COUNT_PROPERTY, CONDENSED_MARKER_PROPERTY, CONDENSED_META_FIELD};
    use cnd_delegate_mock::MockDelegate;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn condensed_envelope(count: u64) -> OwnedMessage {
        let mut meta = serde_json::Map::new();
        meta.insert("condensed".to_string(), Value::Bool(true));
        meta.insert("count".to_string(), Value::from(count));
        let mut body = serde_json::Map::new();
        body.insert("v".to_string(), Value::from(1));
        body.insert(CONDENSED_META_FIELD.to_string(), Value::Object(meta));
        OwnedMessage::with_body(Value::Object(body).to_string())
            .with_property(CONDENSED_MARKER_PROPERTY, true)
            .with_property(CONDENSED_COUNT_PROPERTY, count as i64)
    }

    #[tokio::test]
    async fn non_condensed_message_passes_through_untouched() {
        let delegate = Arc::new(MockDelegate::new());
        delegate.push_inbound(OwnedMessage::with_body(r#"{"v":1}"#)).await;
        let consumer = ExpandingConsumer::new(delegate);
        let received = consumer.receive(None).await.unwrap().unwrap();
        assert_eq!(received.body.as_deref(), Some(r#"{"v":1}"#));
        assert_eq!(consumer.queued_count().await, 0);
    }

    #[tokio::test]
    async fn condensed_envelope_is_expanded_and_drained_one_at_a_time() {
        let delegate = Arc::new(MockDelegate::new());
        delegate.push_inbound(condensed_envelope(3)).await;
        let consumer = ExpandingConsumer::new(delegate);

        assert!(consumer.receive(None).await.unwrap().is_some());
        assert_eq!(consumer.queued_count().await, 2);
        assert!(consumer.receive(None).await.unwrap().is_some());
        assert_eq!(consumer.queued_count().await, 1);
        assert!(consumer.receive(None).await.unwrap().is_some());
        assert_eq!(consumer.queued_count().await, 0);
        assert!(consumer.receive(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_queue_drops_overflow_with_warning_not_panic() {
        let delegate = Arc::new(MockDelegate::new());
        delegate.push_inbound(condensed_envelope(5)).await;
        let consumer = ExpandingConsumer::with_capacity(delegate, 2);
        consumer.receive(None).await.unwrap();
        assert_eq!(consumer.queued_count().await, 2);
    }

    #[tokio::test]
    async fn close_discards_queue_and_closes_delegate() {
        let delegate = Arc::new(MockDelegate::new());
        delegate.push_inbound(condensed_envelope(3)).await;
        let consumer = ExpandingConsumer::new(delegate);
        consumer.receive(None).await.unwrap();
        assert_eq!(consumer.queued_count().await, 2);
        consumer.close().await.unwrap();
        assert_eq!(consumer.queued_count().await, 0);
    }

    #[test]
    fn deliver_continues_past_a_panicking_listener_item() {
        let delegate = Arc::new(MockDelegate::new());
        let consumer = ExpandingConsumer::new(delegate);
        let delivered = Arc::new(AtomicUsize::new(0));
        let delivered_clone = delivered.clone();
        let panicked_once = StdMutex::new(false);

        consumer.deliver(condensed_envelope(3), &move |_msg| {
            let mut panicked = panicked_once.lock().unwrap();
            if !*panicked {
                *panicked = true;
                panic!("simulated listener failure");
            }
            delivered_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }
}
