// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delegate abstraction.
//!
//! The broker client itself — connection, session, destinations, wire
//! transport, acknowledgment — is out of scope. What the proxy actually
//! needs is a producer it can `send` through and a consumer it can
//! `receive` from, each modeled as a trait so tests can swap in an
//! in-memory delegate (see `cnd-delegate-mock`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use cnd_core::OwnedMessage;
use std::time::Duration;
use thiserror::Error;

/// Delivery mode requested for a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Survive a broker restart.
    #[default]
    Persistent,
    /// May be dropped on a broker restart.
    NonPersistent,
}

/// Errors surfaced by a delegate. These map onto the `Delegate*` members of
/// the error taxonomy in `cnd-error`.
#[derive(Debug, Error)]
pub enum DelegateError {
    /// The delegate rejected a send.
    #[error("delegate send failed: {0}")]
    SendFailed(String),
    /// The delegate's receive call failed.
    #[error("delegate receive failed: {0}")]
    ReceiveFailed(String),
    /// The delegate could not be closed cleanly.
    #[error("delegate close failed: {0}")]
    CloseFailed(String),
}

/// The producer side of the delegate: `send(msg)` plus a destination-less
/// overload for producers bound to a single default destination.
#[async_trait]
pub trait DelegateProducer: Send + Sync {
    /// The destination this producer is bound to by default, if any.
    ///
    /// When the caller's destination is `None` or equals this value, the
    /// proxy invokes [`Self::send_to_default`] instead of
    /// [`Self::send`] — some hosts reject re-specifying a destination on a
    /// producer already bound to one.
    fn default_destination(&self) -> Option<&str>;

    /// Send to an explicit destination.
    async fn send(
        &self,
        destination: &str,
        message: OwnedMessage,
        delivery_mode: DeliveryMode,
        priority: u8,
        ttl: Option<Duration>,
    ) -> Result<(), DelegateError>;

    /// Send to this producer's preset default destination.
    async fn send_to_default(
        &self,
        message: OwnedMessage,
        delivery_mode: DeliveryMode,
        priority: u8,
        ttl: Option<Duration>,
    ) -> Result<(), DelegateError>;

    /// Close the producer.
    async fn close(&self) -> Result<(), DelegateError>;
}

/// The consumer side of the delegate: pull-style `receive([timeout])`.
#[async_trait]
pub trait DelegateConsumer: Send + Sync {
    /// Receive one message, waiting up to `timeout` (no-wait if `None` is
    /// interpreted by the implementation as "return immediately").
    async fn receive(&self, timeout: Option<Duration>) -> Result<Option<OwnedMessage>, DelegateError>;

    /// Close the consumer.
    async fn close(&self) -> Result<(), DelegateError>;
}
