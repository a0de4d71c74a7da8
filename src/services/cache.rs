//! Bounded query result cache.
//!
//! Keys are the verbatim query string; no normalization is applied, so
//! `"Auth"` and `"auth "` are distinct entries.

use crate::models::RoutingResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    result: RoutingResult,
    stored_at: Instant,
}

/// LRU cache of routing results with optional expiry.
///
/// # Lock Poisoning
///
/// A poisoned lock is recovered rather than propagated: the cache only holds
/// clones of finished results, so no entry can be observed half-written.
#[derive(Debug)]
pub struct QueryCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Option<Duration>,
}

impl QueryCache {
    /// Creates a cache holding at most `capacity` queries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the cached result for `query`, if present and fresh.
    #[must_use]
    pub fn get(&self, query: &str) -> Option<RoutingResult> {
        let mut entries = self.lock();
        let expired = match entries.get(query) {
            None => return None,
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.stored_at.elapsed() >= ttl),
        };
        if expired {
            entries.pop(query);
            return None;
        }
        entries.get(query).map(|entry| entry.result.clone())
    }

    /// Stores `result` under `query`, evicting the least recently used entry if full.
    pub fn insert(&self, query: &str, result: RoutingResult) {
        self.lock().put(
            query.to_string(),
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of stored entries (including any not yet observed as expired).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
