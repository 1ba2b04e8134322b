//! Bounded least-recently-used memo of pretoken → token ids.
//!
//! The cache is shared by every caller of a [`crate::Tokenizer`], so reads and
//! writes (a hit reorders recency) go through one mutex. A poisoned lock is
//! treated as a miss: the cache never decides what an encoding is.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use log::debug;
use lru::LruCache;

use crate::model::TokenId;

/// Thread-safe LRU cache keyed by the raw pretoken string.
#[derive(Debug)]
pub struct EncodeCache {
    entries: Mutex<LruCache<String, Vec<TokenId>>>,
    capacity: NonZeroUsize,
}

impl EncodeCache {
    /// Creates a cache holding at most `capacity` pretokens; `None` when `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
        })
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Returns a copy of the cached ids and marks the entry most recently used.
    pub fn get(&self, pretoken: &str) -> Option<Vec<TokenId>> {
        let mut entries = self.entries.lock().ok()?;
        entries.get(pretoken).cloned()
    }

    /// Stores `ids` for `pretoken`, evicting the least recently used entry when full.
    pub fn insert(&self, pretoken: &str, ids: &[TokenId]) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(pretoken.to_owned(), ids.to_vec());
        }
    }

    /// Returns `true` when `pretoken` is cached, without touching recency.
    pub fn contains(&self, pretoken: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains(pretoken))
            .unwrap_or(false)
    }

    /// Number of cached pretokens.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            debug!("clearing {} cached pretokens", entries.len());
            entries.clear();
        }
    }
}
