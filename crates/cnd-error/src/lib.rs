// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the condenser proxy.
//!
//! Every error that crosses a component boundary carries a [`CndError`]: a
//! stable, machine-readable [`ErrorCode`], a human-readable message, an
//! optional cause, and arbitrary key-value context. Use the builder returned
//! by [`CndError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Content could not be treated as condensable (not structured, parse error).
    Content,
    /// The delegate broker-client rejected or failed a send/receive.
    Delegate,
    /// Envelope materialization (canonicalization + aggregation) failed.
    Envelope,
    /// Consumer-side expansion of a condensed envelope failed.
    Expansion,
    /// Scheduler or proxy shutdown did not complete within its deadline.
    Shutdown,
    /// Configuration is invalid.
    Config,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Content => "content",
            Self::Delegate => "delegate",
            Self::Envelope => "envelope",
            Self::Expansion => "expansion",
            Self::Shutdown => "shutdown",
            Self::Config => "config",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Content rejection --
    /// Message has no textual body.
    ContentEmptyBody,
    /// Body does not begin with `{` or `[`.
    ContentNotStructured,
    /// Body looked structured but failed to parse.
    ContentParseFailed,

    // -- Delegate --
    /// The delegate rejected a send.
    DelegateSendFailed,
    /// The delegate's receive call failed or timed out unexpectedly.
    DelegateReceiveFailed,
    /// The delegate could not be closed cleanly.
    DelegateCloseFailed,

    // -- Envelope --
    /// Envelope materialization could not produce a canonical form.
    EnvelopeMaterializationFailed,

    // -- Expansion --
    /// The envelope body could not be parsed during expansion.
    ExpansionParseFailed,
    /// The `_condensedMeta` block was missing or malformed.
    ExpansionMetaInvalid,

    // -- Shutdown --
    /// The scheduler worker did not exit before the shutdown deadline.
    ShutdownTimedOut,

    // -- Config --
    /// A configuration value is invalid.
    ConfigInvalid,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ContentEmptyBody | Self::ContentNotStructured | Self::ContentParseFailed => {
                ErrorCategory::Content
            }
            Self::DelegateSendFailed | Self::DelegateReceiveFailed | Self::DelegateCloseFailed => {
                ErrorCategory::Delegate
            }
            Self::EnvelopeMaterializationFailed => ErrorCategory::Envelope,
            Self::ExpansionParseFailed | Self::ExpansionMetaInvalid => ErrorCategory::Expansion,
            Self::ShutdownTimedOut => ErrorCategory::Shutdown,
            Self::ConfigInvalid => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"DELEGATE_SEND_FAILED"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentEmptyBody => "CONTENT_EMPTY_BODY",
            Self::ContentNotStructured => "CONTENT_NOT_STRUCTURED",
            Self::ContentParseFailed => "CONTENT_PARSE_FAILED",
            Self::DelegateSendFailed => "DELEGATE_SEND_FAILED",
            Self::DelegateReceiveFailed => "DELEGATE_RECEIVE_FAILED",
            Self::DelegateCloseFailed => "DELEGATE_CLOSE_FAILED",
            Self::EnvelopeMaterializationFailed => "ENVELOPE_MATERIALIZATION_FAILED",
            Self::ExpansionParseFailed => "EXPANSION_PARSE_FAILED",
            Self::ExpansionMetaInvalid => "EXPANSION_META_INVALID",
            Self::ShutdownTimedOut => "SHUTDOWN_TIMED_OUT",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CndError
// ---------------------------------------------------------------------------

/// Unified condenser error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Examples
///
/// ```
/// use cnd_error::{CndError, ErrorCode};
///
/// let err = CndError::new(ErrorCode::DelegateSendFailed, "broker rejected send")
///     .with_context("destination", "orders.out")
///     .with_context("attempt", 1);
/// ```
pub struct CndError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl CndError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for CndError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("CndError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for CndError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CndError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|b| b.as_ref() as &(dyn std::error::Error + 'static))
    }
}
