// SPDX-License-Identifier: MIT OR Apache-2.0
//! Comparison strategy (component C3).
//!
//! A [`ComparisonStrategy`] turns message content into a [`SimilarityKey`].
//! The default implementation is field-exclusion over a configurable
//! timestamp-field set, backed by the canonicalizer (C1) and optionally the
//! key cache (C2).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use cnd_core::SimilarityKey;
use cnd_keycache::KeyCache;
use std::collections::BTreeSet;

/// Field names excluded from the comparison key by default.
///
/// These are the common spellings of "this field is a timestamp and should
/// not defeat similarity matching."
pub fn default_timestamp_fields() -> BTreeSet<String> {
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

/// Policy turning content into a [`SimilarityKey`].
pub trait ComparisonStrategy: Send + Sync {
    /// Compute the comparison key for `content`.
    fn compute_comparison_key(&self, content: &str) -> SimilarityKey;
}

/// Default strategy: canonicalize with a configurable top-level field
/// exclusion set, optionally backed by a [`KeyCache`].
pub struct FieldExclusionStrategy {
    exclude: BTreeSet<String>,
    cache: Option<KeyCache>,
}

impl FieldExclusionStrategy {
    /// Build a strategy excluding the given fields, with no cache.
    pub fn new(exclude: BTreeSet<String>) -> Self {
        Self {
            exclude,
            cache: None,
        }
    }

    /// Build a strategy excluding the default timestamp fields (§4.3), with
    /// no cache.
    pub fn with_defaults() -> Self {
        Self::new(default_timestamp_fields())
    }

    /// Attach a [`KeyCache`] so repeated identical content skips
    /// canonicalization.
    #[must_use]
    pub fn with_cache(mut self, cache: KeyCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The configured exclusion set.
    pub fn exclude(&self) -> &BTreeSet<String> {
        &self.exclude
    }
}

impl ComparisonStrategy for FieldExclusionStrategy {
    fn compute_comparison_key(&self, content: &str) -> SimilarityKey {
        let canonical = match &self.cache {
            Some(cache) => cache.key_for(content, &self.exclude),
            None => cnd_canon::canonical_key(content, &self.exclude),
        };
        SimilarityKey::new(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_modulo_timestamp_coalesces() {
        let strategy = FieldExclusionStrategy::with_defaults();
        let k1 = strategy.compute_comparison_key(r#"{"v":42,"timestamp":1000}"#);
        let k2 = strategy.compute_comparison_key(r#"{"v":42,"timestamp":1001}"#);
        assert_eq!(k1, k2);
    }

    #[test]
    fn differing_non_excluded_fields_do_not_coalesce() {
        let strategy = FieldExclusionStrategy::with_defaults();
        let k1 = strategy.compute_comparison_key(r#"{"v":42}"#);
        let k2 = strategy.compute_comparison_key(r#"{"v":43}"#);
        assert_ne!(k1, k2);
    }

    #[test]
    fn cache_backed_strategy_matches_uncached() {
        let plain = FieldExclusionStrategy::with_defaults();
        let cached = FieldExclusionStrategy::with_defaults().with_cache(KeyCache::default());
        let content = r#"{"v":1,"timestamp":5}"#;
        assert_eq!(
            plain.compute_comparison_key(content),
            cached.compute_comparison_key(content)
        );
    }
}
