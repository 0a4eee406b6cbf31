// SPDX-License-Identifier: MIT OR Apache-2.0
//! Similarity-key cache (component C2).
//!
//! An insertion/access-ordered map from a hash of raw content to its
//! computed canonical key, bounded to 1,000 entries with LRU eviction.
//! Content hashes collide only rarely in the target workload (near-identical
//! messages); the cache is a strict performance aid, never a correctness
//! dependency — a miss just recomputes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Default bound on the number of cached entries.
pub const DEFAULT_CAPACITY: usize = 1_000;

/// Content-hash → canonical-key cache.
///
/// Internally synchronized; safe to share across admitting threads. Never
/// held nested with the condensation buffer's latch (see the concurrency
/// model this crate implements part of).
pub struct KeyCache {
    inner: Mutex<LruCache<[u8; 32], String>>,
}

impl KeyCache {
    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity.max(1) is nonzero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Compute the similarity key for `content`, using the cache when
    /// possible.
    ///
    /// A cache hit skips canonicalization entirely; a miss canonicalizes
    /// and inserts the result keyed by the content's hash.
    pub fn key_for(&self, content: &str, exclude: &BTreeSet<String>) -> String {
        let hash = hash_content(content);
        let mut guard = self.inner.lock().expect("key cache lock poisoned");
        if let Some(hit) = guard.get(&hash) {
            return hit.clone();
        }
        drop(guard);
        let computed = cnd_canon::canonical_key(content, exclude);
        let mut guard = self.inner.lock().expect("key cache lock poisoned");
        guard.put(hash, computed.clone());
        computed
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("key cache lock poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn hash_content(content: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_same_key_without_recompute() {
        let cache = KeyCache::new(4);
        let exclude = BTreeSet::new();
        let first = cache.key_for(r#"{"a":1}"#, &exclude);
        let second = cache.key_for(r#"{"a":1}"#, &exclude);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_content_gets_distinct_entries() {
        let cache = KeyCache::new(4);
        let exclude = BTreeSet::new();
        cache.key_for(r#"{"a":1}"#, &exclude);
        cache.key_for(r#"{"a":2}"#, &exclude);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn eviction_respects_capacity() {
        let cache = KeyCache::new(2);
        let exclude = BTreeSet::new();
        cache.key_for(r#"{"a":1}"#, &exclude);
        cache.key_for(r#"{"a":2}"#, &exclude);
        cache.key_for(r#"{"a":3}"#, &exclude);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn correctness_holds_on_a_fresh_miss() {
        let cache = KeyCache::new(1000);
        let exclude: BTreeSet<String> = ["timestamp".to_string()].into_iter().collect();
        let key = cache.key_for(r#"{"timestamp":1,"v":9}"#, &exclude);
        assert_eq!(key, cnd_canon::canonical_key(r#"{"timestamp":1,"v":9}"#, &exclude));
    }
}
