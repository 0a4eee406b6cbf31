// SPDX-License-Identifier: MIT OR Apache-2.0
//! Proxy configuration surface (§6), defaults, and non-fatal validation.
//!
//! `ProxyConfig` is immutable once built via [`ProxyConfigBuilder`].
//! Validation never aborts on an odd-but-legal value — it collects
//! [`ConfigWarning`]s instead, the same shape this codebase uses elsewhere
//! for config linting.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        (val.as_millis() as u64).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Immutable proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Enable the condensation branch of the send path.
    pub condenser_enabled: bool,
    /// Enable the criteria gate.
    pub criteria_enabled: bool,
    /// Per-key max retention before forced emit.
    #[serde(with = "duration_millis")]
    pub window: Duration,
    /// Per-key max batch length before forced emit.
    pub max_batch_size: usize,
    /// Scheduler one-shot delay.
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
    /// Reserved: when false, implementations may reorder across keys.
    pub preserve_message_order: bool,
    /// Expose input/output counters.
    pub enable_metrics: bool,
    /// Top-level fields excluded from the comparison key.
    pub timestamp_fields_exclude: BTreeSet<String>,
    /// Top-level fields extracted per-original into `_condensedMeta`.
    pub timestamp_fields_extract: Vec<String>,
}

impl ConfigDefaults {
    /// `condenserEnabled` default: `true`.
    pub const CONDENSER_ENABLED: bool = true;
    /// `criteriaEnabled` default: `true`.
    pub const CRITERIA_ENABLED: bool = true;
    /// `condenserWindowMs` default: `1000`.
    pub const WINDOW_MS: u64 = 1_000;
    /// `condenserMaxBatchSize` default: `100`.
    pub const MAX_BATCH_SIZE: usize = 100;
    /// `flushIntervalMs` default: `500`.
    pub const FLUSH_INTERVAL_MS: u64 = 500;
    /// `preserveMessageOrder` default: `true`.
    pub const PRESERVE_MESSAGE_ORDER: bool = true;
    /// `enableMetrics` default: `false`.
    pub const ENABLE_METRICS: bool = false;
    /// Default consumer queue capacity (§4.9).
    pub const CONSUMER_QUEUE_CAPACITY: usize = 1_000;
    /// Default similarity-key cache capacity (§4.2).
    pub const KEY_CACHE_CAPACITY: usize = 1_000;

    fn default_exclude_fields() -> BTreeSet<String> {
        [
            "timestamp",
            "time",
            "datetime",
            "date",
            "ts",
            "createdAt",
            "created_at",
            "updatedAt",
            "updated_at",
            "eventTime",
            "event_time",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }

    fn default_extract_fields() -> Vec<String> {
        [
            "timestamp",
            "time",
            "datetime",
            "ts",
            "createdAt",
            "created_at",
            "eventTime",
            "event_time",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    }
}

/// Named default-value accessors for [`ProxyConfig`] fields (§6).
pub struct ConfigDefaults;

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            condenser_enabled: ConfigDefaults::CONDENSER_ENABLED,
            criteria_enabled: ConfigDefaults::CRITERIA_ENABLED,
            window: Duration::from_millis(ConfigDefaults::WINDOW_MS),
            max_batch_size: ConfigDefaults::MAX_BATCH_SIZE,
            flush_interval: Duration::from_millis(ConfigDefaults::FLUSH_INTERVAL_MS),
            preserve_message_order: ConfigDefaults::PRESERVE_MESSAGE_ORDER,
            enable_metrics: ConfigDefaults::ENABLE_METRICS,
            timestamp_fields_exclude: ConfigDefaults::default_exclude_fields(),
            timestamp_fields_extract: ConfigDefaults::default_extract_fields(),
        }
    }
}

/// Fluent builder for [`ProxyConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `condenserEnabled`.
    #[must_use]
    pub fn condenser_enabled(mut self, enabled: bool) -> Self {
        self.config.condenser_enabled = enabled;
        self
    }

    /// Set `criteriaEnabled`.
    #[must_use]
    pub fn criteria_enabled(mut self, enabled: bool) -> Self {
        self.config.criteria_enabled = enabled;
        self
    }

    /// Set `condenserWindowMs`.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// Set `condenserMaxBatchSize`.
    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    /// Set `flushIntervalMs`.
    #[must_use]
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.config.flush_interval = interval;
        self
    }

    /// Set `preserveMessageOrder`.
    #[must_use]
    pub fn preserve_message_order(mut self, preserve: bool) -> Self {
        self.config.preserve_message_order = preserve;
        self
    }

    /// Set `enableMetrics`.
    #[must_use]
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.config.enable_metrics = enable;
        self
    }

    /// Replace the timestamp exclusion set.
    #[must_use]
    pub fn timestamp_fields_exclude(mut self, fields: BTreeSet<String>) -> Self {
        self.config.timestamp_fields_exclude = fields;
        self
    }

    /// Replace the timestamp extraction list.
    #[must_use]
    pub fn timestamp_fields_extract(mut self, fields: Vec<String>) -> Self {
        self.config.timestamp_fields_extract = fields;
        self
    }

    /// Finalize the configuration.
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}

/// Severity of a [`ConfigWarning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningSeverity {
    /// Informational; no action needed.
    Info,
    /// Likely to surprise the operator but not incorrect.
    Warning,
}

/// A non-fatal finding about a [`ProxyConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigWarning {
    /// How serious this finding is.
    pub severity: WarningSeverity,
    /// Human-readable explanation.
    pub message: String,
}

/// Produces [`ConfigWarning`]s for legal-but-questionable configurations.
///
/// Never returns an error: a `ProxyConfig` that reaches this validator is
/// always usable, just possibly ill-advised.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate `config`, returning any warnings found.
    pub fn validate(config: &ProxyConfig) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if config.condenser_enabled && config.max_batch_size <= 1 {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::Warning,
                message: "max_batch_size <= 1 defeats condensation; every batch flushes immediately".to_string(),
            });
        }

        if config.condenser_enabled && config.flush_interval.is_zero() {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::Warning,
                message: "flush_interval of zero degenerates into fixed-rate polling".to_string(),
            });
        }

        if config.flush_interval > config.window && !config.window.is_zero() {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::Info,
                message: "flush_interval exceeds window; worst-case over-retention is flush_interval + window"
                    .to_string(),
            });
        }

        if !config.preserve_message_order {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::Info,
                message: "preserve_message_order=false has no defined effect in this implementation".to_string(),
            });
        }

        if config.timestamp_fields_extract.is_empty() {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::Info,
                message: "no timestamp fields configured for extraction; _condensedMeta.originalTimestamps will always be omitted".to_string(),
            });
        }

        warnings
    }
}
