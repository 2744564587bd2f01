//! Content-addressed memo of prior extraction and merge results.
//!
//! A [`ResultCache`] remembers, per pipeline instance, what the model
//! already answered for a given input: QA pairs keyed by segment text,
//! merge decisions keyed by the leading questions of each side. Repeated
//! identical segments across a document (or across calls on the same
//! instance) never re-invoke the model.
//!
//! **This is a performance optimization, not a correctness mechanism.**
//! The model is non-deterministic, so a cache hit returns what an earlier
//! call happened to produce; a miss always safely recomputes. Concurrent
//! parallel-mode batches touching overlapping content cost at most one
//! duplicated model call. The map is mutex-guarded, entries are never
//! persisted, and there is no eviction: retention is bounded only by the
//! lifetime of the pipeline instance, which callers should keep in mind
//! for very large documents.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};

/// Hash a sequence of text parts into a cache key.
///
/// Parts are length-prefixed before hashing so distinct splits of the same
/// concatenation cannot collide.
#[must_use]
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// In-memory memo map from content hash to a previously computed value.
#[derive(Debug, Default)]
pub struct ResultCache<V> {
    entries: Mutex<FxHashMap<String, V>>,
}

impl<V: Clone> ResultCache<V> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Look up a previously stored value.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    /// Store a computed value. Last write wins on overlapping keys.
    pub fn store(&self, key: String, value: V) {
        self.entries.lock().insert(key, value);
    }

    /// Number of memoized entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// `true` when nothing has been memoized yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Snapshot of cache usage across a pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries in the extraction cache.
    pub qa_entries: usize,
    /// Entries in the merge-decision cache.
    pub merge_entries: usize,
}

impl CacheStats {
    /// Combined entry count.
    #[must_use]
    pub fn total(&self) -> usize {
        self.qa_entries + self.merge_entries
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_then_lookup() {
        let cache = ResultCache::new();
        let key = content_hash(&["some segment text"]);
        assert!(cache.lookup(&key).is_none());

        cache.store(key.clone(), vec![1, 2, 3]);
        assert_eq!(cache.lookup(&key), Some(vec![1, 2, 3]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = ResultCache::new();
        cache.store(content_hash(&["a"]), 1u8);
        cache.store(content_hash(&["b"]), 2u8);
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn hash_is_stable_and_input_sensitive() {
        assert_eq!(content_hash(&["abc"]), content_hash(&["abc"]));
        assert_ne!(content_hash(&["abc"]), content_hash(&["abd"]));
        // Length prefixing keeps part boundaries significant.
        assert_ne!(content_hash(&["ab", "c"]), content_hash(&["a", "bc"]));
    }

    #[test]
    fn stats_total() {
        let stats = CacheStats {
            qa_entries: 3,
            merge_entries: 2,
        };
        assert_eq!(stats.total(), 5);
    }
}
