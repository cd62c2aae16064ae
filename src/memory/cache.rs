//! Bounded result cache with TTL expiry and LRU eviction.
//!
//! Values are cloned on read so callers never share mutable cache state.
//! Lookups only touch recency metadata; `store` and the eviction it may
//! trigger are the only structural mutations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::key::CacheKey;
use crate::engine::{AnalysisContext, AnalysisResult, Payload};

/// Configuration for the result cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl: Duration,
    /// Fold request context into the cache key.
    pub include_context: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl: Duration::from_secs(30 * 60),
            include_context: true,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: AnalysisResult,
    created_at: Instant,
    last_accessed_at: Instant,
    /// Monotonic access stamp; breaks `last_accessed_at` ties deterministically.
    access_seq: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    access_counter: u64,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.access_counter += 1;
        self.access_counter
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.last_accessed_at, e.access_seq))
            .map(|(k, _)| *k)?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

/// LRU + TTL cache keyed by normalized payload and context.
#[derive(Debug)]
pub struct ResultCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(config.max_entries.min(4096)),
                access_counter: 0,
            }),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Key under which `payload` and `context` are cached.
    pub fn key_for(&self, payload: &Payload, context: &AnalysisContext) -> CacheKey {
        CacheKey::derive(payload, context, self.config.include_context)
    }

    /// Look up a cached result. Counts toward the hit rate.
    pub fn lookup(&self, payload: &Payload, context: &AnalysisContext) -> Option<AnalysisResult> {
        self.lookup_key(&self.key_for(payload, context))
    }

    /// Store a result for `payload` and `context`.
    pub fn store(&self, payload: &Payload, context: &AnalysisContext, value: AnalysisResult) {
        self.store_key(self.key_for(payload, context), value);
    }

    /// Key-based lookup. Counts toward the hit rate.
    pub fn lookup_key(&self, key: &CacheKey) -> Option<AnalysisResult> {
        let found = self.get(key);
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Key-based lookup that leaves hit/miss counters alone.
    ///
    /// Used for the in-batch re-check, which would otherwise count every
    /// queued request twice.
    pub fn recheck_key(&self, key: &CacheKey) -> Option<AnalysisResult> {
        self.get(key)
    }

    /// True when a live entry exists. Does not refresh recency.
    pub fn contains_key(&self, key: &CacheKey) -> bool {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .is_some_and(|e| e.created_at.elapsed() <= self.config.ttl)
    }

    pub fn store_key(&self, key: CacheKey, value: AnalysisResult) {
        let mut state = self.state.lock();
        let now = Instant::now();
        let seq = state.next_seq();

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.max_entries {
            if let Some(evicted) = state.evict_lru() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key = %evicted.short(), "cache: evicted least recently used entry");
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                created_at: now,
                last_accessed_at: now,
                access_seq: seq,
            },
        );
    }

    fn get(&self, key: &CacheKey) -> Option<AnalysisResult> {
        let mut state = self.state.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => entry.created_at.elapsed() > self.config.ttl,
        };
        if expired {
            state.entries.remove(key);
            return None;
        }

        let seq = state.next_seq();
        let entry = state.entries.get_mut(key)?;
        entry.last_accessed_at = Instant::now();
        entry.access_seq = seq;
        Some(entry.value.clone())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        let ttl = self.config.ttl;
        state.entries.retain(|_, e| e.created_at.elapsed() <= ttl);
        before - state.entries.len()
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Hits over total counted lookups; 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
