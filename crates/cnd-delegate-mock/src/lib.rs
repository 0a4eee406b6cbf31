// SPDX-License-Identifier: MIT OR Apache-2.0
//! An in-memory [`DelegateProducer`]/[`DelegateConsumer`] pair for tests.
//!
//! Records every send in order and serves `receive` from a pre-loaded
//! queue, so end-to-end scenarios can assert on exactly what the proxy
//! would have put on the wire without standing up a real broker.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use cnd_core::OwnedMessage;
use cnd_delegate::{DelegateConsumer, DelegateError, DelegateProducer, DeliveryMode};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

/// A single recorded send.
#[derive(Debug, Clone)]
pub struct RecordedSend {
    /// Destination used, or `None` if the default-destination overload was
    /// invoked.
    pub destination: Option<String>,
    /// The message that was sent.
    pub message: OwnedMessage,
    /// Delivery mode used.
    pub delivery_mode: DeliveryMode,
    /// Priority used.
    pub priority: u8,
    /// TTL used, if any.
    pub ttl: Option<Duration>,
}

/// An in-memory delegate: records sends, serves receives from a queue.
#[derive(Default)]
pub struct MockDelegate {
    default_destination: Option<String>,
    sent: Mutex<Vec<RecordedSend>>,
    inbound: Mutex<VecDeque<OwnedMessage>>,
    fail_next_send: Mutex<bool>,
}

impl MockDelegate {
    /// Create a delegate with no preset default destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a delegate bound to a default destination.
    pub fn with_default_destination(destination: impl Into<String>) -> Self {
        Self {
            default_destination: Some(destination.into()),
            ..Self::default()
        }
    }

    /// Queue a message to be returned by the next `receive` call(s).
    pub async fn push_inbound(&self, message: OwnedMessage) {
        self.inbound.lock().await.push_back(message);
    }

    /// Arrange for the next `send`/`send_to_default` call to fail.
    pub async fn fail_next_send(&self) {
        *self.fail_next_send.lock().await = true;
    }

    /// All sends recorded so far, in order.
    pub async fn sent(&self) -> Vec<RecordedSend> {
        self.sent.lock().await.clone()
    }

    async fn record(
        &self,
        destination: Option<&str>,
        message: OwnedMessage,
        delivery_mode: DeliveryMode,
        priority: u8,
        ttl: Option<Duration>,
    ) -> Result<(), DelegateError> {
        if std::mem::take(&mut *self.fail_next_send.lock().await) {
            return Err(DelegateError::SendFailed("simulated broker rejection".to_string()));
        }
        self.sent.lock().await.push(RecordedSend {
            destination: destination.map(str::to_string),
            message,
            delivery_mode,
            priority,
            ttl,
        });
        Ok(())
    }
}

#[async_trait]
impl DelegateProducer for MockDelegate {
    fn default_destination(&self) -> Option<&str> {
        self.default_destination.as_deref()
    }

    async fn send(
        &self,
        destination: &str,
        message: OwnedMessage,
        delivery_mode: DeliveryMode,
        priority: u8,
        ttl: Option<Duration>,
    ) -> Result<(), DelegateError> {
        self.record(Some(destination), message, delivery_mode, priority, ttl).await
    }

    async fn send_to_default(
        &self,
        message: OwnedMessage,
        delivery_mode: DeliveryMode,
        priority: u8,
        ttl: Option<Duration>,
    ) -> Result<(), DelegateError> {
        self.record(None, message, delivery_mode, priority, ttl).await
    }

    async fn close(&self) -> Result<(), DelegateError> {
        Ok(())
    }
}

#[async_trait]
impl DelegateConsumer for MockDelegate {
    async fn receive(&self, _timeout: Option<Duration>) -> Result<Option<OwnedMessage>, DelegateError> {
        Ok(self.inbound.lock().await.pop_front())
    }

    async fn close(&self) -> Result<(), DelegateError> {
        Ok(())
    }
}
