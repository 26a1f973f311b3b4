//! In-memory fuzzy result cache with popularity-ranked eviction.

use crate::query::{normalize, similarity};
use crate::types::SharedResults;
use serde::Serialize;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const EXACT_HIT_WEIGHT: f64 = 1.0;
const FUZZY_HIT_WEIGHT: f64 = 0.5;
const INITIAL_POPULARITY: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    /// Minimum similarity for a fuzzy hit.
    pub fuzzy_threshold: f64,
    /// Fraction of `max_entries` the cache shrinks back to when it fills up.
    pub eviction_target_ratio: f64,
    /// Entries older than `ttl * refresh_ratio` are due for a warming re-fetch.
    pub refresh_ratio: f64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 1000,
            fuzzy_threshold: 0.8,
            eviction_target_ratio: 0.8,
            refresh_ratio: 0.8,
        }
    }
}

impl ResultCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }
    pub fn with_fuzzy_threshold(mut self, t: f64) -> Self {
        self.fuzzy_threshold = t;
        self
    }
    pub fn with_eviction_target_ratio(mut self, r: f64) -> Self {
        self.eviction_target_ratio = r;
        self
    }
    pub fn with_refresh_ratio(mut self, r: f64) -> Self {
        self.refresh_ratio = r;
        self
    }

    fn eviction_target(&self) -> usize {
        ((self.max_entries as f64) * self.eviction_target_ratio).floor() as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HitKind {
    Exact,
    Fuzzy { matched: String, similarity: f64 },
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub results: SharedResults,
    pub kind: HitKind,
}

/// Read-only view of one entry, used for cache warming and diagnostics.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub query: String,
    pub hit_count: u64,
    pub popularity_score: f64,
    pub result_count: usize,
    pub age: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultCacheStats {
    pub queries_observed: u64,
    pub exact_hits: u64,
    pub fuzzy_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl ResultCacheStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.queries_observed == 0 {
            0.0
        } else {
            (self.exact_hits + self.fuzzy_hits) as f64 / self.queries_observed as f64
        }
    }
}

struct AtomicStats {
    queries: AtomicU64,
    exact_hits: AtomicU64,
    fuzzy_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            queries: AtomicU64::new(0),
            exact_hits: AtomicU64::new(0),
            fuzzy_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }
}

struct CacheEntry {
    query: String,
    results: SharedResults,
    created_at: Instant,
    hit_count: u64,
    popularity_score: f64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }

    fn snapshot(&self, now: Instant) -> EntrySnapshot {
        EntrySnapshot {
            query: self.query.clone(),
            hit_count: self.hit_count,
            popularity_score: self.popularity_score,
            result_count: self.results.len(),
            age: now.saturating_duration_since(self.created_at),
        }
    }
}

/// Normalized query → result set, with exact and fuzzy lookup.
///
/// - `created_at` never changes after insert; `hit_count` and `popularity_score` only grow
/// - Expired entries read as absent and are purged lazily
/// - None of the operations fail; a poisoned lock reads as a miss
pub struct ResultCache {
    config: ResultCacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    stats: AtomicStats,
}

impl ResultCache {
    pub fn new(config: ResultCacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            stats: AtomicStats::new(),
        }
    }

    pub fn config(&self) -> &ResultCacheConfig {
        &self.config
    }

    /// Results for `raw_query`, exact key first, then the most similar unexpired entry.
    pub fn get(&self, raw_query: &str) -> Option<SharedResults> {
        self.lookup(raw_query).map(|hit| hit.results)
    }

    /// Like [`get`](Self::get), but reports whether the hit was exact or fuzzy.
    pub fn lookup(&self, raw_query: &str) -> Option<CacheHit> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        let key = normalize(raw_query);
        let Ok(mut entries) = self.entries.lock() else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let now = Instant::now();
        let ttl = self.config.ttl;

        if let Some(entry) = entries.get_mut(&key) {
            if !entry.is_expired(ttl, now) {
                entry.hit_count += 1;
                entry.popularity_score += EXACT_HIT_WEIGHT;
                self.stats.exact_hits.fetch_add(1, Ordering::Relaxed);
                debug!(query = %key, hits = entry.hit_count, "result cache exact hit");
                return Some(CacheHit {
                    results: entry.results.clone(),
                    kind: HitKind::Exact,
                });
            }
        }

        let threshold = self.config.fuzzy_threshold;
        let key_len = key.chars().count();
        let best = entries
            .iter_mut()
            .filter(|(_, e)| !e.is_expired(ttl, now))
            .filter(|(k, _)| length_allows(key_len, k.chars().count(), threshold))
            .map(|(k, e)| (similarity(&key, k), e))
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(CmpOrdering::Equal));

        if let Some((score, entry)) = best {
            if score >= threshold {
                entry.popularity_score += FUZZY_HIT_WEIGHT;
                self.stats.fuzzy_hits.fetch_add(1, Ordering::Relaxed);
                debug!(query = %key, matched = %entry.query, similarity = score, "result cache fuzzy hit");
                return Some(CacheHit {
                    results: entry.results.clone(),
                    kind: HitKind::Fuzzy {
                        matched: entry.query.clone(),
                        similarity: score,
                    },
                });
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite the entry for `raw_query`. Cleans up first when the
    /// cache is at capacity so the insert never grows it past the eviction target.
    pub fn set(&self, raw_query: &str, results: impl Into<SharedResults>) {
        let key = normalize(raw_query);
        if key.is_empty() {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let now = Instant::now();
        if entries.len() >= self.config.max_entries {
            self.cleanup_locked(&mut entries, now);
        }
        entries.insert(
            key.clone(),
            CacheEntry {
                query: key,
                results: results.into(),
                created_at: now,
                hit_count: 0,
                popularity_score: INITIAL_POPULARITY,
            },
        );
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    fn cleanup_locked(&self, entries: &mut HashMap<String, CacheEntry>, now: Instant) {
        let ttl = self.config.ttl;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(ttl, now));
        let expired = before - entries.len();

        // Leave room for the entry about to be inserted.
        let keep = self.config.eviction_target().saturating_sub(1);
        let mut evicted = 0;
        if entries.len() > keep {
            let mut ranked: Vec<(String, f64, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.popularity_score, e.created_at))
                .collect();
            ranked.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(CmpOrdering::Equal)
                    .then(a.2.cmp(&b.2))
            });
            let excess = entries.len() - keep;
            for (k, _, _) in ranked.into_iter().take(excess) {
                entries.remove(&k);
                evicted += 1;
            }
        }
        self.stats
            .evictions
            .fetch_add((expired + evicted) as u64, Ordering::Relaxed);
        debug!(expired, evicted, remaining = entries.len(), "result cache cleanup");
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let now = Instant::now();
        let ttl = self.config.ttl;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(ttl, now));
        let removed = before - entries.len();
        self.stats
            .evictions
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// The `limit` most popular unexpired entries, most popular first.
    pub fn get_popular_queries(&self, limit: usize) -> Vec<EntrySnapshot> {
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let now = Instant::now();
        let mut live: Vec<EntrySnapshot> = entries
            .values()
            .filter(|e| !e.is_expired(self.config.ttl, now))
            .map(|e| e.snapshot(now))
            .collect();
        live.sort_by(|a, b| {
            b.popularity_score
                .partial_cmp(&a.popularity_score)
                .unwrap_or(CmpOrdering::Equal)
        });
        live.truncate(limit);
        live
    }

    /// Whether warming should re-fetch this entry before it expires.
    pub fn needs_refresh(&self, entry: &EntrySnapshot) -> bool {
        entry.age >= self.config.ttl.mul_f64(self.config.refresh_ratio)
    }

    /// Inspect an entry by exact key without counting it as a lookup.
    pub fn peek(&self, raw_query: &str) -> Option<EntrySnapshot> {
        let key = normalize(raw_query);
        let entries = self.entries.lock().ok()?;
        let now = Instant::now();
        entries
            .get(&key)
            .filter(|e| !e.is_expired(self.config.ttl, now))
            .map(|e| e.snapshot(now))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn stats(&self) -> ResultCacheStats {
        ResultCacheStats {
            queries_observed: self.stats.queries.load(Ordering::Relaxed),
            exact_hits: self.stats.exact_hits.load(Ordering::Relaxed),
            fuzzy_hits: self.stats.fuzzy_hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            sets: self.stats.sets.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(ResultCacheConfig::default())
    }
}

/// Cheap pre-filter: similarity can never reach `threshold` when the lengths
/// differ by more than `(1 - threshold) * max_len`.
fn length_allows(a: usize, b: usize, threshold: f64) -> bool {
    let longest = a.max(b);
    if longest == 0 {
        return true;
    }
    let diff = a.abs_diff(b) as f64;
    1.0 - diff / longest as f64 >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProductRecord;
    use std::sync::Arc;

    fn results(tag: &str, n: usize) -> Vec<ProductRecord> {
        (0..n)
            .map(|i| ProductRecord::new(format!("{tag}-{i}"), format!("{tag} item {i}")))
            .collect()
    }

    #[test]
    fn exact_hit_after_normalization() {
        let cache = ResultCache::default();
        let r = results("shoes", 3);
        cache.set("Blue Shoes", r.clone());

        let hit = cache.lookup("blue   shoes").expect("hit");
        assert_eq!(hit.kind, HitKind::Exact);
        assert_eq!(*hit.results, r);

        let snap = cache.peek("blue shoes").unwrap();
        assert_eq!(snap.hit_count, 1);
        assert_eq!(snap.popularity_score, 2.0);
    }

    #[test]
    fn fuzzy_hit_boundary() {
        let cache = ResultCache::default();
        cache.set("sneakers", results("sneakers", 2));

        let hit = cache.lookup("sneaker").expect("fuzzy hit");
        match hit.kind {
            HitKind::Fuzzy { matched, similarity } => {
                assert_eq!(matched, "sneakers");
                assert!(similarity >= 0.8);
            }
            other => panic!("expected fuzzy hit, got {other:?}"),
        }
        assert!(cache.get("xyz").is_none());

        // Fuzzy hits weigh half of an exact hit and do not bump hit_count.
        let snap = cache.peek("sneakers").unwrap();
        assert_eq!(snap.popularity_score, 1.5);
        assert_eq!(snap.hit_count, 0);
    }

    #[test]
    fn every_lookup_is_observed() {
        let cache = ResultCache::default();
        cache.set("wallet", results("wallet", 1));
        cache.get("wallet");
        cache.get("wallets");
        cache.get("completely different");
        let stats = cache.stats();
        assert_eq!(stats.queries_observed, 3);
        assert_eq!(stats.exact_hits, 1);
        assert_eq!(stats.fuzzy_hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_expiry() {
        let cache = ResultCache::new(ResultCacheConfig::new().with_ttl(Duration::from_secs(3600)));
        cache.set("scented candle", results("candle", 2));

        tokio::time::advance(Duration::from_secs(59 * 60)).await;
        assert!(cache.get("scented candle").is_some());

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert!(cache.get("scented candle").is_none());
        // Expired entries are not served by the fuzzy path either.
        assert!(cache.get("scented candles").is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_near_expiry_need_refresh() {
        let cache = ResultCache::new(
            ResultCacheConfig::new()
                .with_ttl(Duration::from_secs(100))
                .with_refresh_ratio(0.8),
        );
        cache.set("silk scarf", results("scarf", 1));
        let fresh = cache.peek("silk scarf").unwrap();
        assert!(!cache.needs_refresh(&fresh));

        tokio::time::advance(Duration::from_secs(80)).await;
        let aging = cache.peek("silk scarf").unwrap();
        assert!(cache.needs_refresh(&aging));
    }

    #[test]
    fn eviction_drops_least_popular_first() {
        let cache = ResultCache::default();
        for i in 0..1000 {
            cache.set(&format!("query number {i:04}"), results("q", 1));
        }
        assert_eq!(cache.len(), 1000);

        // Make a handful of entries clearly more popular.
        let favourites = ["query number 0000", "query number 0500", "query number 0999"];
        for q in favourites {
            for _ in 0..3 {
                assert!(cache.get(q).is_some());
            }
        }

        cache.set("one more query", results("extra", 1));
        assert!(cache.len() <= 800, "len = {}", cache.len());
        for q in favourites {
            assert!(cache.peek(q).is_some(), "{q} should survive eviction");
        }
        assert!(cache.peek("one more query").is_some());
        assert!(cache.stats().evictions >= 200);
    }

    #[test]
    fn popular_queries_ranked_by_score() {
        let cache = ResultCache::default();
        cache.set("wallet", results("wallet", 1));
        cache.set("watch", results("watch", 1));
        cache.set("scarf", results("scarf", 1));
        cache.get("watch");
        cache.get("watch");
        cache.get("scarf");

        let popular = cache.get_popular_queries(2);
        let names: Vec<_> = popular.iter().map(|e| e.query.as_str()).collect();
        assert_eq!(names, vec!["watch", "scarf"]);
    }

    #[test]
    fn results_are_shared_not_copied() {
        let cache = ResultCache::default();
        let shared: SharedResults = Arc::new(results("lamp", 2));
        cache.set("lamp", shared.clone());
        let got = cache.get("lamp").unwrap();
        assert!(Arc::ptr_eq(&shared, &got));
    }

    #[test]
    fn empty_query_is_never_cached() {
        let cache = ResultCache::default();
        cache.set("  !!  ", results("x", 1));
        assert!(cache.is_empty());
        assert!(cache.get("").is_none());
    }

    #[test]
    fn length_prefilter() {
        assert!(length_allows(8, 7, 0.8));
        assert!(!length_allows(8, 3, 0.8));
        assert!(length_allows(0, 0, 0.8));
    }
}
