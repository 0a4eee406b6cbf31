// SPDX-License-Identifier: MIT OR Apache-2.0
//! Condenser proxy facade.
//!
//! Re-exports the public surface downstream consumers actually need —
//! [`ProxyConfig`], [`CondensingProxy`], [`ExpandingConsumer`] — so an
//! application can depend on this crate alone instead of wiring up each
//! leaf crate by hand. Anything more specialized (the canonicalizer, the
//! key cache, a custom `ComparisonStrategy`) is still reachable through the
//! `cnd-*` crates directly.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub use cnd_config::{ConfigDefaults, ConfigValidator, ConfigWarning, ProxyConfig, ProxyConfigBuilder, WarningSeverity};
pub use cnd_consumer::{ExpandingConsumer, DEFAULT_QUEUE_CAPACITY};
pub use cnd_core::{
    Clock, Headers, ManualClock, Message, MonotonicClock, OwnedMessage, PropertyValue, CONDENSED_COUNT_PROPERTY,
    CONDENSED_MARKER_PROPERTY, CONDENSED_META_FIELD, CONDENSED_TIMESTAMPS_PROPERTY,
};
pub use cnd_delegate::{DelegateConsumer, DelegateError, DelegateProducer, DeliveryMode};
pub use cnd_error::{CndError, ErrorCategory, ErrorCode};
pub use cnd_expand::{default_timestamp_restore_field, expand, is_condensed};
pub use cnd_proxy::{CompletionListener, CondensingProxy, Criterion};
pub use cnd_strategy::{default_timestamp_fields, ComparisonStrategy, FieldExclusionStrategy};
pub use cnd_telemetry::{Stats, StatsSnapshot};

/// Install a `tracing` subscriber reading `RUST_LOG`, falling back to `info`.
///
/// Intended for examples and tests; real deployments wire up their own
/// subscriber.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn facade_wires_a_working_proxy() {
        let delegate = Arc::new(cnd_delegate_mock::MockDelegate::with_default_destination("out"));
        let strategy = Arc::new(FieldExclusionStrategy::with_defaults());
        let config = ProxyConfigBuilder::new()
            .window(Duration::from_millis(50))
            .max_batch_size(10)
            .build();
        let proxy = CondensingProxy::new(config, delegate.clone(), strategy);

        proxy.send(None, OwnedMessage::with_body(r#"{"a":1}"#)).await.unwrap();
        proxy.flush().await;

        assert_eq!(delegate.sent().await.len(), 1);
    }
}
