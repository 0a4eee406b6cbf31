// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared data model for the condenser proxy.
//!
//! This crate has no behavior of its own: it defines the [`Message`]
//! contract the rest of the crates read and build through, the buffer/
//! envelope value types ([`BufferedMessage`], [`SimilarityKey`],
//! [`CondensedEnvelope`]), and a monotonic [`Clock`] abstraction used
//! instead of wall-clock time for arrival/flush-readiness bookkeeping.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod envelope;
mod message;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use envelope::{BufferedMessage, CondensedEnvelope, EnvelopeContent, OriginalMeta, SimilarityKey};
pub use message::{DirectMessageFactory, Headers, Message, MessageFactory, OwnedMessage, PropertyValue};

/// Reserved top-level body field carrying condensation metadata.
pub const CONDENSED_META_FIELD: &str = "_condensedMeta";

/// Wire property marking an envelope as condensed.
pub const CONDENSED_MARKER_PROPERTY: &str = "_JMS_PROXY_CONDENSED_";

/// Wire property carrying the number of originals in a condensed envelope.
pub const CONDENSED_COUNT_PROPERTY: &str = "_JMS_PROXY_CONDENSED_COUNT_";

/// Wire property carrying the first original's timestamp, for convenience.
pub const CONDENSED_TIMESTAMPS_PROPERTY: &str = "_JMS_PROXY_CONDENSED_TIMESTAMPS_";
