// SPDX-License-Identifier: MIT OR Apache-2.0
//! The message contract the condenser proxy reads and builds through.
//!
//! The broker client itself (connection, session, destinations, wire
//! transport, acknowledgment) is out of scope for this crate — see the
//! `cnd-delegate` crate for the trait the proxy drives instead. What lives
//! here is the narrow view onto a message that every component needs: a
//! textual body, named scalar properties, and a handful of standard
//! headers. The core never constructs a message directly; it asks a
//! [`MessageFactory`] to build one.

use std::collections::BTreeMap;

/// A named scalar property value on a message.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// UTF-8 string property.
    Str(String),
    /// 32-bit integer property.
    Int(i32),
    /// 64-bit integer property.
    Long(i64),
    /// Boolean property.
    Bool(bool),
}

impl PropertyValue {
    /// View this value as a `bool`, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// View this value as an `i64`, widening `Int` if necessary.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            Self::Int(v) => Some(*v as i64),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

/// Standard header fields carried by every message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    /// Broker-assigned or application-assigned message identifier.
    pub message_id: Option<String>,
    /// Correlation identifier linking related messages.
    pub correlation_id: Option<String>,
    /// Priority, 0 (lowest) to 9 (highest).
    pub priority: u8,
    /// Application-defined type tag.
    pub type_tag: Option<String>,
    /// Absolute expiration time in epoch milliseconds, if any.
    pub expiration: Option<i64>,
    /// Send timestamp in epoch milliseconds.
    pub timestamp: i64,
}

/// Read-only view onto a message's body, headers, and properties.
///
/// This is the only way the core touches a message. It never matches on a
/// concrete wire type.
pub trait Message: Send + Sync {
    /// The textual body, if the message carries one.
    fn body(&self) -> Option<&str>;
    /// The standard header fields.
    fn headers(&self) -> &Headers;
    /// Look up a named scalar property.
    fn property(&self, name: &str) -> Option<&PropertyValue>;
    /// All scalar properties, in no particular order.
    fn properties(&self) -> &BTreeMap<String, PropertyValue>;
}

/// A concrete, owned message.
///
/// This is the only [`Message`] implementation the core ships; it is also
/// what a [`MessageFactory`] produces. Real deployments adapt this onto
/// whatever broker-client message type they actually have.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnedMessage {
    /// The textual body.
    pub body: Option<String>,
    /// Standard headers.
    pub headers: Headers,
    /// Scalar properties, keyed by name.
    pub properties: BTreeMap<String, PropertyValue>,
}

impl OwnedMessage {
    /// Build a message with the given body and default headers/properties.
    pub fn with_body(body: impl Into<String>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }

    /// Set a property, returning `self` for chaining.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Set the headers, returning `self` for chaining.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }
}

impl Message for OwnedMessage {
    fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }
}

/// Stands in for "ask the host session to build a message."
///
/// The proxy and expansion engine never call a message constructor
/// directly — they go through this factory, matching the source design's
/// rule that the core only ever asks the host session to build a message
/// with a given body and property set.
pub trait MessageFactory: Send + Sync {
    /// Build a new message with the given body, headers, and properties.
    fn build(
        &self,
        body: String,
        headers: Headers,
        properties: BTreeMap<String, PropertyValue>,
    ) -> OwnedMessage;
}

/// The default [`MessageFactory`]: constructs an [`OwnedMessage`] directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectMessageFactory;

impl MessageFactory for DirectMessageFactory {
    fn build(
        &self,
        body: String,
        headers: Headers,
        properties: BTreeMap<String, PropertyValue>,
    ) -> OwnedMessage {
        OwnedMessage {
            body: Some(body),
            headers,
            properties,
        }
    }
}
