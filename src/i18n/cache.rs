//! Bounded bundle cache with frequency-weighted LRU eviction and TTL expiry.

use crate::clock::Clock;
use crate::config::Config;
use crate::i18n::bundle::{ResourceBundle, ResourceKey};
use crate::sync::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// A resident bundle plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Arc<ResourceBundle>,
    pub inserted_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Time since last access divided by how often the entry was used.
    /// Higher means a better eviction victim.
    fn staleness(&self, now: DateTime<Utc>) -> f64 {
        let gap = elapsed(self.last_accessed_at, now).as_micros() as f64;
        gap / (self.access_count as f64 + 1.0)
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    /// Hit rate as a percentage (0-100)
    pub hit_rate: f64,
    pub total_bytes: usize,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<ResourceKey, CacheEntry>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    fn remove(&mut self, key: &ResourceKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn eviction_candidate(&self, now: DateTime<Utc>) -> Option<ResourceKey> {
        self.entries
            .iter()
            .max_by(|(key_a, a), (key_b, b)| {
                a.staleness(now)
                    .partial_cmp(&b.staleness(now))
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.access_count.cmp(&a.access_count))
                    .then_with(|| b.last_accessed_at.cmp(&a.last_accessed_at))
                    .then_with(|| b.inserted_at.cmp(&a.inserted_at))
                    .then_with(|| key_b.cmp(key_a))
            })
            .map(|(key, _)| key.clone())
    }
}

/// Thread-safe cache of namespace bundles.
///
/// Invariants: at most `max_entries` entries, at most `max_memory_bytes` of
/// estimated size, and no entry older than `ttl` is ever returned.
pub struct CacheStore {
    inner: Mutex<CacheInner>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    max_memory_bytes: usize,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(
        max_entries: usize,
        max_memory_bytes: usize,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            clock,
            max_entries: max_entries.max(1),
            max_memory_bytes,
            ttl,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.max_entries,
            config.max_memory_bytes,
            config.ttl,
            clock,
        )
    }

    /// Return the bundle for `key`, counting a hit or a miss.
    ///
    /// Expired entries are deleted and reported as misses.
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<ResourceBundle>> {
        let now = self.clock.now();
        let mut inner = lock(&self.inner);

        let expired = inner
            .entries
            .get(key)
            .map(|entry| elapsed(entry.inserted_at, now) > self.ttl);

        let Some(expired) = expired else {
            inner.misses += 1;
            return None;
        };

        if expired {
            inner.remove(key);
            inner.misses += 1;
            debug!("Cache entry {} expired", key);
            return None;
        }

        inner.hits += 1;
        let entry = inner.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        entry.access_count += 1;
        Some(Arc::clone(&entry.data))
    }

    /// Insert or replace `key`, evicting as needed.
    ///
    /// Returns `false` when the bundle alone exceeds the memory budget and was
    /// therefore not cached.
    pub fn set(&self, key: ResourceKey, bundle: Arc<ResourceBundle>) -> bool {
        let size_bytes = bundle.size_bytes();
        let now = self.clock.now();
        let mut inner = lock(&self.inner);

        inner.remove(&key);

        if size_bytes > self.max_memory_bytes {
            warn!(
                "Not caching {}: {} bytes exceeds the {} byte budget",
                key, size_bytes, self.max_memory_bytes
            );
            return false;
        }

        while !inner.entries.is_empty()
            && (inner.entries.len() >= self.max_entries
                || inner.total_bytes + size_bytes > self.max_memory_bytes)
        {
            let Some(victim) = inner.eviction_candidate(now) else {
                break;
            };
            inner.remove(&victim);
            inner.evictions += 1;
            debug!("Evicted {} from resource cache", victim);
        }

        inner.total_bytes += size_bytes;
        inner.entries.insert(
            key,
            CacheEntry {
                data: bundle,
                inserted_at: now,
                last_accessed_at: now,
                access_count: 0,
                size_bytes,
            },
        );
        true
    }

    /// Whether a fresh entry exists. Touches neither counters nor recency.
    pub fn has(&self, key: &ResourceKey) -> bool {
        let now = self.clock.now();
        lock(&self.inner)
            .entries
            .get(key)
            .is_some_and(|entry| elapsed(entry.inserted_at, now) <= self.ttl)
    }

    /// Fresh bundle for `key` without touching counters or recency.
    pub fn peek(&self, key: &ResourceKey) -> Option<Arc<ResourceBundle>> {
        let now = self.clock.now();
        lock(&self.inner)
            .entries
            .get(key)
            .filter(|entry| elapsed(entry.inserted_at, now) <= self.ttl)
            .map(|entry| Arc::clone(&entry.data))
    }

    pub fn delete(&self, key: &ResourceKey) -> bool {
        lock(&self.inner).remove(key).is_some()
    }

    /// Drop every namespace of `language`. Returns how many were removed.
    pub fn delete_language(&self, language: &str) -> usize {
        let mut inner = lock(&self.inner);
        let keys: Vec<ResourceKey> = inner
            .entries
            .keys()
            .filter(|key| key.language == language)
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        keys.len()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    /// Eagerly drop expired entries. Returns how many were purged.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = lock(&self.inner);
        let expired: Vec<ResourceKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| elapsed(entry.inserted_at, now) > self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = lock(&self.inner).entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        let lookups = inner.hits + inner.misses;
        let hit_rate = if lookups > 0 {
            (inner.hits as f64 / lookups as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            size: inner.entries.len(),
            hit_count: inner.hits,
            miss_count: inner.misses,
            eviction_count: inner.evictions,
            hit_rate,
            total_bytes: inner.total_bytes,
        }
    }
}

/// Wall-clock time from `since` to `now`; zero if the clock went backwards.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn bundle(value: &str) -> Arc<ResourceBundle> {
        let doc = format!(r#"{{"value":"{}"}}"#, value);
        Arc::new(ResourceBundle::from_slice(doc.as_bytes()).unwrap())
    }

    fn key(language: &str) -> ResourceKey {
        ResourceKey::new(language, "common")
    }

    fn store(max_entries: usize, clock: Arc<ManualClock>) -> CacheStore {
        CacheStore::new(max_entries, 1024 * 1024, Duration::from_secs(60), clock)
    }

    // ==================== Eviction ====================

    #[test]
    fn test_recently_accessed_entry_survives_eviction() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(2, clock.clone());

        cache.set(key("a"), bundle("A"));
        clock.advance(chrono::Duration::milliseconds(10));
        cache.set(key("b"), bundle("B"));
        clock.advance(chrono::Duration::milliseconds(10));
        assert!(cache.get(&key("a")).is_some());
        clock.advance(chrono::Duration::milliseconds(10));
        cache.set(key("c"), bundle("C"));

        assert!(cache.has(&key("a")));
        assert!(!cache.has(&key("b")));
        assert!(cache.has(&key("c")));
        assert_eq!(cache.stats().eviction_count, 1);
    }

    #[test]
    fn test_eviction_at_identical_instants_prefers_unused_entry() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(2, clock);

        cache.set(key("a"), bundle("A"));
        cache.set(key("b"), bundle("B"));
        cache.get(&key("a"));
        cache.set(key("c"), bundle("C"));

        assert_eq!(cache.keys(), vec![key("a"), key("c")]);
    }

    #[test]
    fn test_frequency_outweighs_slightly_older_access() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(2, clock.clone());

        cache.set(key("hot"), bundle("H"));
        for _ in 0..9 {
            cache.get(&key("hot"));
        }
        clock.advance(chrono::Duration::milliseconds(10));
        cache.set(key("cold"), bundle("C"));
        clock.advance(chrono::Duration::milliseconds(10));
        cache.set(key("new"), bundle("N"));

        // hot: 20ms / 10 = 2; cold: 10ms / 1 = 10
        assert!(cache.has(&key("hot")));
        assert!(!cache.has(&key("cold")));
    }

    #[test]
    fn test_long_idle_entry_is_evicted_despite_past_use() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(2, clock.clone());

        cache.set(key("old"), bundle("O"));
        cache.get(&key("old"));
        clock.advance(chrono::Duration::seconds(10));
        cache.set(key("recent"), bundle("R"));
        clock.advance(chrono::Duration::milliseconds(10));
        cache.set(key("new"), bundle("N"));

        // old: 10010ms / 2; recent: 10ms / 1
        assert!(!cache.has(&key("old")));
        assert!(cache.has(&key("recent")));
    }

    #[test]
    fn test_memory_budget_evicts_until_new_entry_fits() {
        let clock = Arc::new(ManualClock::default());
        let one = bundle("A").size_bytes();
        let cache = CacheStore::new(10, one * 2, Duration::from_secs(60), clock.clone());

        cache.set(key("a"), bundle("A"));
        clock.advance(chrono::Duration::milliseconds(1));
        cache.set(key("b"), bundle("B"));
        clock.advance(chrono::Duration::milliseconds(1));
        cache.set(key("c"), bundle("C"));

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert!(stats.total_bytes <= one * 2);
        assert!(!cache.has(&key("a")));
    }

    #[test]
    fn test_oversized_bundle_is_not_cached() {
        let clock = Arc::new(ManualClock::default());
        let cache = CacheStore::new(10, 4, Duration::from_secs(60), clock);

        assert!(!cache.set(key("a"), bundle("far too large")));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().total_bytes, 0);
    }

    #[test]
    fn test_replacing_key_does_not_evict_or_double_count() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(2, clock);

        cache.set(key("a"), bundle("A"));
        cache.set(key("b"), bundle("B"));
        cache.set(key("a"), bundle("A2"));

        let stats = cache.stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.eviction_count, 0);
        assert_eq!(
            stats.total_bytes,
            bundle("A2").size_bytes() + bundle("B").size_bytes()
        );
        assert_eq!(cache.get(&key("a")).unwrap().get("value"), Some("A2"));
    }

    // ==================== TTL ====================

    #[test]
    fn test_expired_entry_is_a_miss_and_is_removed() {
        let clock = Arc::new(ManualClock::default());
        let cache = CacheStore::new(10, 1024, Duration::from_millis(1000), clock.clone());

        cache.set(key("en"), bundle("A"));
        clock.advance(chrono::Duration::milliseconds(1000));
        assert!(cache.get(&key("en")).is_some());

        clock.advance(chrono::Duration::milliseconds(1));
        assert!(cache.get(&key("en")).is_none());
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[test]
    fn test_purge_expired_sweeps_eagerly() {
        let clock = Arc::new(ManualClock::default());
        let cache = CacheStore::new(10, 4096, Duration::from_millis(100), clock.clone());

        cache.set(key("a"), bundle("A"));
        clock.advance(chrono::Duration::milliseconds(60));
        cache.set(key("b"), bundle("B"));
        clock.advance(chrono::Duration::milliseconds(60));

        assert!(!cache.has(&key("a")));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.keys(), vec![key("b")]);
    }

    // ==================== Bookkeeping ====================

    #[test]
    fn test_stats_hit_rate() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(4, clock);
        cache.set(key("a"), bundle("A"));

        cache.get(&key("a"));
        cache.get(&key("a"));
        cache.get(&key("a"));
        cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hit_rate, 75.0);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_has_does_not_touch_counters() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(4, clock);
        cache.set(key("a"), bundle("A"));

        assert!(cache.has(&key("a")));
        assert!(!cache.has(&key("b")));

        let stats = cache.stats();
        assert_eq!(stats.hit_count + stats.miss_count, 0);
    }

    #[test]
    fn test_peek_skips_counters_and_expired_entries() {
        let clock = Arc::new(ManualClock::default());
        let cache = CacheStore::new(4, 4096, Duration::from_millis(100), clock.clone());
        cache.set(key("a"), bundle("A"));

        assert!(cache.peek(&key("a")).is_some());
        assert!(cache.peek(&key("b")).is_none());
        clock.advance(chrono::Duration::milliseconds(101));
        assert!(cache.peek(&key("a")).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hit_count + stats.miss_count, 0);
    }

    #[test]
    fn test_delete_language_and_clear() {
        let clock = Arc::new(ManualClock::default());
        let cache = store(10, clock);
        cache.set(ResourceKey::new("en", "common"), bundle("A"));
        cache.set(ResourceKey::new("en", "menu"), bundle("B"));
        cache.set(ResourceKey::new("fr", "common"), bundle("C"));

        assert_eq!(cache.delete_language("en"), 2);
        assert_eq!(cache.keys(), vec![ResourceKey::new("fr", "common")]);
        assert!(cache.delete(&ResourceKey::new("fr", "common")));
        assert!(!cache.delete(&ResourceKey::new("fr", "common")));

        cache.set(ResourceKey::new("de", "common"), bundle("D"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().total_bytes, 0);
    }

    // ==================== Properties ====================

    proptest! {
        #[test]
        fn prop_bounds_hold_for_any_operation_sequence(
            ops in proptest::collection::vec((0u8..3, 0usize..8, 0usize..40), 1..80),
            max_entries in 1usize..5,
        ) {
            let clock = Arc::new(ManualClock::default());
            let max_bytes = 120;
            let cache = CacheStore::new(max_entries, max_bytes, Duration::from_secs(60), clock.clone());

            for (op, lang, len) in ops {
                let k = ResourceKey::new(format!("l{}", lang), "common");
                match op {
                    0 => { cache.set(k, bundle(&"x".repeat(len))); }
                    1 => { cache.get(&k); }
                    _ => { cache.delete(&k); }
                }
                clock.advance(chrono::Duration::milliseconds(1));

                let stats = cache.stats();
                prop_assert!(stats.size <= max_entries);
                prop_assert!(stats.total_bytes <= max_bytes);
            }
        }
    }
}
