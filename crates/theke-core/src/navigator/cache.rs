//! Rendered-content cache with TTL and capacity eviction.

use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::errors::ThekeResult;

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheMode {
    Hit,
    Miss,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Least-recently-used map from a render key to markup. A capacity of zero
/// disables caching entirely.
pub struct RenderCache {
    max_entries: usize,
    ttl: Duration,
    cache: Mutex<IndexMap<String, CacheEntry>>,
    counters: Mutex<Counters>,
}

impl RenderCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries,
            ttl: ttl.max(Duration::from_millis(100)),
            cache: Mutex::new(IndexMap::new()),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn key(parts: &[&str]) -> String {
        parts.join("\u{1f}")
    }

    fn evict_expired(&self) {
        let mut cache = self.cache.lock();
        let now = Instant::now();
        cache.retain(|_, entry| entry.expires_at > now);
    }

    fn evict_over_capacity(&self) {
        let mut cache = self.cache.lock();
        while cache.len() > self.max_entries {
            cache.shift_remove_index(0);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.max_entries == 0 {
            return None;
        }
        self.evict_expired();
        let mut cache = self.cache.lock();
        let entry = cache.shift_remove(key)?;
        let value = entry.value.clone();
        // Re-insert at the back for LRU order.
        cache.insert(key.to_string(), entry);
        Some(value)
    }

    pub fn insert(&self, key: String, value: String) {
        if self.max_entries == 0 {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.cache.lock().insert(key, CacheEntry { value, expires_at });
        self.evict_over_capacity();
    }

    pub fn get_or_compute<F>(&self, key: &str, compute: F) -> ThekeResult<(String, CacheMode)>
    where
        F: FnOnce() -> ThekeResult<String>,
    {
        if let Some(value) = self.get(key) {
            self.counters.lock().hits += 1;
            trace!(key, "render cache hit");
            return Ok((value, CacheMode::Hit));
        }
        self.counters.lock().misses += 1;
        trace!(key, "render cache miss");
        let value = compute()?;
        self.insert(key.to_string(), value.clone());
        Ok((value, CacheMode::Miss))
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let counters = self.counters.lock();
        CacheStats {
            entries: self.cache.lock().len(),
            max_entries: self.max_entries,
            hits: counters.hits,
            misses: counters.misses,
        }
    }
}
