//! Two-tier cache for category and brand searches.

use super::backend::SharedTier;
use super::key::TieredKey;
use super::policy::TtlPolicy;
use crate::types::ProductRecord;
use crate::utils::{Clock, SystemClock};
use crate::Result;
use bytes::Bytes;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bumped whenever the serialized entry layout changes; older entries read as misses.
pub const CACHE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredEntry {
    pub data: Vec<ProductRecord>,
    /// Seconds since the Unix epoch.
    pub created_at: f64,
    pub ttl_seconds: u64,
    pub version: u32,
}

impl TieredEntry {
    pub fn is_valid(&self, now: f64, version: u32) -> bool {
        self.version == version && now < self.created_at + self.ttl_seconds as f64
    }
}

#[derive(Debug, Clone)]
pub struct TieredCacheConfig {
    pub local_capacity: usize,
    pub version: u32,
    pub ttl: TtlPolicy,
    /// How long an unreachable shared tier is left alone before it is pinged again.
    pub shared_retry: Duration,
}

impl Default for TieredCacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: 512,
            version: CACHE_FORMAT_VERSION,
            ttl: TtlPolicy::default(),
            shared_retry: Duration::from_secs(30),
        }
    }
}

impl TieredCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_local_capacity(mut self, n: usize) -> Self {
        self.local_capacity = n;
        self
    }
    pub fn with_version(mut self, v: u32) -> Self {
        self.version = v;
        self
    }
    pub fn with_ttl_policy(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_shared_retry(mut self, every: Duration) -> Self {
        self.shared_retry = every;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TieredCacheStats {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub backfills: u64,
    pub sets: u64,
    pub shared_errors: u64,
    pub local_entries: usize,
    pub shared_available: bool,
}

#[derive(Default)]
struct AtomicStats {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    backfills: AtomicU64,
    sets: AtomicU64,
    shared_errors: AtomicU64,
}

/// Fast local LRU tier in front of an optional shared tier.
///
/// Reads check local first, then shared; a valid shared hit is backfilled
/// locally. Writes go to both tiers. When the shared tier is absent or
/// unreachable the cache runs local-only and never reports an error; an
/// unreachable tier is pinged again once `shared_retry` has passed.
pub struct TieredCache {
    config: TieredCacheConfig,
    local: Mutex<LruCache<String, TieredEntry>>,
    shared: Option<Arc<dyn SharedTier>>,
    shared_available: AtomicBool,
    /// Clock seconds of the last ping attempt.
    last_shared_check: Mutex<Option<f64>>,
    clock: Arc<dyn Clock>,
    stats: AtomicStats,
}

impl TieredCache {
    pub fn new(config: TieredCacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: TieredCacheConfig, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(config.local_capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            local: Mutex::new(LruCache::new(capacity)),
            shared: None,
            shared_available: AtomicBool::new(false),
            last_shared_check: Mutex::new(None),
            clock,
            stats: AtomicStats::default(),
        }
    }

    /// Attach a shared tier. It is used only after a successful
    /// [`check_shared_tier`](Self::check_shared_tier).
    pub fn with_shared_tier(mut self, tier: Arc<dyn SharedTier>) -> Self {
        self.shared = Some(tier);
        self
    }

    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    /// Ping the shared tier and record whether it is usable. Returns the new state.
    pub async fn check_shared_tier(&self) -> bool {
        let Some(tier) = &self.shared else {
            return false;
        };
        if let Ok(mut last) = self.last_shared_check.lock() {
            *last = Some(self.clock.now());
        }
        let ok = match tier.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(tier = tier.name(), error = %e, "shared cache tier unavailable, running local-only");
                false
            }
        };
        let was = self.shared_available.swap(ok, Ordering::SeqCst);
        if ok && !was {
            info!(tier = tier.name(), "shared cache tier connected");
        }
        ok
    }

    pub fn shared_available(&self) -> bool {
        self.shared.is_some() && self.shared_available.load(Ordering::SeqCst)
    }

    /// The shared tier if it is usable, re-pinging a failed one when its retry is due.
    async fn active_shared(&self) -> Option<&Arc<dyn SharedTier>> {
        let tier = self.shared.as_ref()?;
        if self.shared_available.load(Ordering::SeqCst) {
            return Some(tier);
        }
        if !self.claim_shared_retry() {
            return None;
        }
        debug!(tier = tier.name(), "retrying unavailable shared cache tier");
        self.check_shared_tier().await.then_some(tier)
    }

    /// Whether this caller should re-ping; at most one caller per retry interval wins.
    fn claim_shared_retry(&self) -> bool {
        let now = self.clock.now();
        let Ok(mut last) = self.last_shared_check.lock() else {
            return false;
        };
        let due = match *last {
            Some(at) => now - at >= self.config.shared_retry.as_secs_f64(),
            None => true,
        };
        if due {
            *last = Some(now);
        }
        due
    }

    fn mark_shared_failure(&self, tier: &Arc<dyn SharedTier>, op: &str, err: &crate::Error) {
        self.stats.shared_errors.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_shared_check.lock() {
            *last = Some(self.clock.now());
        }
        if self.shared_available.swap(false, Ordering::SeqCst) {
            warn!(tier = tier.name(), op, error = %err, "shared cache tier failed, degrading to local-only");
        }
    }

    pub async fn get(&self, key: &TieredKey) -> Option<TieredEntry> {
        let now = self.clock.now();
        let version = self.config.version;

        if let Ok(mut local) = self.local.lock() {
            if let Some(entry) = local.get(key.as_str()) {
                if entry.is_valid(now, version) {
                    self.stats.local_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.clone());
                }
                local.pop(key.as_str());
                self.stats.stale.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(tier) = self.active_shared().await {
            match tier.get(key.as_str()).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<TieredEntry>(&bytes) {
                    Ok(entry) if entry.is_valid(now, version) => {
                        self.stats.shared_hits.fetch_add(1, Ordering::Relaxed);
                        if let Ok(mut local) = self.local.lock() {
                            local.put(key.as_str().to_string(), entry.clone());
                            self.stats.backfills.fetch_add(1, Ordering::Relaxed);
                        }
                        debug!(key = %key, "tiered cache shared hit, backfilled local tier");
                        return Some(entry);
                    }
                    Ok(_) => {
                        self.stats.stale.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        debug!(key = %key, error = %e, "undecodable shared tier entry ignored");
                        self.stats.stale.fetch_add(1, Ordering::Relaxed);
                    }
                },
                Ok(None) => {}
                Err(e) => self.mark_shared_failure(tier, "get", &e),
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `data` under `key` with the TTL of its class.
    pub async fn set(&self, key: &TieredKey, data: Vec<ProductRecord>) -> TieredEntry {
        let ttl = self.config.ttl.ttl_for(key.kind, &key.category);
        self.set_with_ttl(key, data, ttl).await
    }

    pub async fn set_with_ttl(
        &self,
        key: &TieredKey,
        data: Vec<ProductRecord>,
        ttl: Duration,
    ) -> TieredEntry {
        let entry = TieredEntry {
            data,
            created_at: self.clock.now(),
            ttl_seconds: ttl.as_secs(),
            version: self.config.version,
        };
        if let Ok(mut local) = self.local.lock() {
            local.put(key.as_str().to_string(), entry.clone());
        }
        self.stats.sets.fetch_add(1, Ordering::Relaxed);

        if let Some(tier) = self.active_shared().await {
            match serde_json::to_vec(&entry) {
                Ok(bytes) => {
                    if let Err(e) = tier.set_with_ttl(key.as_str(), Bytes::from(bytes), ttl).await {
                        self.mark_shared_failure(tier, "set", &e);
                    }
                }
                Err(e) => warn!(key = %key, error = %e, "failed to encode tiered cache entry"),
            }
        }
        entry
    }

    /// Remove every local key containing `pattern`. Shared-tier copies are left
    /// to expire on their TTL.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let Ok(mut local) = self.local.lock() else {
            return 0;
        };
        let doomed: Vec<String> = local
            .iter()
            .filter(|(k, _)| k.contains(pattern))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            local.pop(k);
        }
        debug!(pattern, removed = doomed.len(), "tiered cache invalidated by pattern");
        doomed.len()
    }

    /// Populate missing keys by calling `fetch` for each. Failures are logged and skipped.
    /// Returns how many keys were written.
    pub async fn warm<F, Fut>(&self, seeds: Vec<TieredKey>, fetch: F) -> usize
    where
        F: Fn(TieredKey) -> Fut,
        Fut: Future<Output = Result<Vec<ProductRecord>>>,
    {
        let mut warmed = 0;
        for key in seeds {
            if self.contains_local(&key) {
                continue;
            }
            match fetch(key.clone()).await {
                Ok(data) if !data.is_empty() => {
                    self.set(&key, data).await;
                    warmed += 1;
                }
                Ok(_) => debug!(key = %key, "warming produced no data"),
                Err(e) => warn!(key = %key, error = %e, "cache warming fetch failed"),
            }
        }
        warmed
    }

    fn contains_local(&self, key: &TieredKey) -> bool {
        let now = self.clock.now();
        self.local
            .lock()
            .map(|local| {
                local
                    .peek(key.as_str())
                    .map(|e| e.is_valid(now, self.config.version))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn local_len(&self) -> usize {
        self.local.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn clear_local(&self) {
        if let Ok(mut local) = self.local.lock() {
            local.clear();
        }
    }

    pub fn stats(&self) -> TieredCacheStats {
        TieredCacheStats {
            local_hits: self.stats.local_hits.load(Ordering::Relaxed),
            shared_hits: self.stats.shared_hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            stale: self.stats.stale.load(Ordering::Relaxed),
            backfills: self.stats.backfills.load(Ordering::Relaxed),
            sets: self.stats.sets.load(Ordering::Relaxed),
            shared_errors: self.stats.shared_errors.load(Ordering::Relaxed),
            local_entries: self.local_len(),
            shared_available: self.shared_available(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemorySharedTier;
    use crate::cache::key::CacheKind;
    use crate::types::SearchOptions;
    use crate::utils::ManualClock;

    fn products(n: usize) -> Vec<ProductRecord> {
        (0..n)
            .map(|i| ProductRecord::new(format!("p{i}"), format!("Product {i}")))
            .collect()
    }

    fn key(kind: CacheKind, category: &str, term: &str) -> TieredKey {
        TieredKey::new(kind, category, term, &SearchOptions::new())
    }

    #[tokio::test]
    async fn local_only_without_shared_tier() {
        let cache = TieredCache::new(TieredCacheConfig::default());
        let k = key(CacheKind::Category, "books", "");
        assert!(cache.get(&k).await.is_none());
        cache.set(&k, products(2)).await;
        let hit = cache.get(&k).await.unwrap();
        assert_eq!(hit.data.len(), 2);
        assert_eq!(hit.ttl_seconds, 3600);
        assert!(!cache.stats().shared_available);
    }

    #[tokio::test]
    async fn expiry_uses_ttl_class() {
        let clock = Arc::new(ManualClock::default());
        let cache = TieredCache::with_clock(TieredCacheConfig::default(), clock.clone());
        let k = key(CacheKind::Category, "electronics", "");
        cache.set(&k, products(1)).await;

        clock.advance(Duration::from_secs(14 * 60));
        assert!(cache.get(&k).await.is_some());
        clock.advance(Duration::from_secs(2 * 60));
        assert!(cache.get(&k).await.is_none());
        assert_eq!(cache.stats().stale, 1);
        assert_eq!(cache.local_len(), 0);
    }

    #[tokio::test]
    async fn version_mismatch_is_a_miss() {
        let clock = Arc::new(ManualClock::default());
        let shared = Arc::new(MemorySharedTier::default());
        let v1 = TieredCache::with_clock(TieredCacheConfig::new().with_version(1), clock.clone())
            .with_shared_tier(shared.clone());
        assert!(v1.check_shared_tier().await);
        let k = key(CacheKind::Brand, "default", "lego");
        v1.set(&k, products(1)).await;

        let v2 = TieredCache::with_clock(TieredCacheConfig::new().with_version(2), clock)
            .with_shared_tier(shared);
        assert!(v2.check_shared_tier().await);
        assert!(v2.get(&k).await.is_none());
    }

    #[tokio::test]
    async fn shared_hit_backfills_local() {
        let clock = Arc::new(ManualClock::default());
        let shared = Arc::new(MemorySharedTier::default());
        let writer = TieredCache::with_clock(TieredCacheConfig::default(), clock.clone())
            .with_shared_tier(shared.clone());
        writer.check_shared_tier().await;
        let k = key(CacheKind::Category, "toys", "lego");
        writer.set(&k, products(3)).await;

        let reader = TieredCache::with_clock(TieredCacheConfig::default(), clock)
            .with_shared_tier(shared);
        reader.check_shared_tier().await;
        assert_eq!(reader.local_len(), 0);
        let hit = reader.get(&k).await.unwrap();
        assert_eq!(hit.data.len(), 3);
        assert_eq!(reader.local_len(), 1);

        let stats = reader.stats();
        assert_eq!(stats.shared_hits, 1);
        assert_eq!(stats.backfills, 1);

        reader.get(&k).await.unwrap();
        assert_eq!(reader.stats().local_hits, 1);
    }

    #[tokio::test]
    async fn unreachable_shared_tier_degrades_silently() {
        let shared = Arc::new(MemorySharedTier::default());
        let cache = TieredCache::new(TieredCacheConfig::default()).with_shared_tier(shared.clone());
        assert!(cache.check_shared_tier().await);

        shared.set_online(false);
        let k = key(CacheKind::Search, "default", "candles");
        cache.set(&k, products(1)).await;
        assert!(!cache.shared_available());
        assert!(cache.get(&k).await.is_some());
        assert_eq!(cache.stats().shared_errors, 1);

        shared.set_online(true);
        assert!(cache.check_shared_tier().await);
    }

    #[tokio::test]
    async fn failed_shared_tier_is_retried_after_interval() {
        let clock = Arc::new(ManualClock::default());
        let shared = Arc::new(MemorySharedTier::default());
        let cache = TieredCache::with_clock(TieredCacheConfig::default(), clock.clone())
            .with_shared_tier(shared.clone());
        assert!(cache.check_shared_tier().await);

        shared.set_online(false);
        cache.set(&key(CacheKind::Category, "toys", "lego"), products(1)).await;
        assert!(!cache.shared_available());

        shared.set_online(true);
        clock.advance(Duration::from_secs(10));
        cache.set(&key(CacheKind::Category, "toys", "kite"), products(1)).await;
        assert!(!cache.shared_available(), "retry not due yet");
        assert!(shared.is_empty());

        clock.advance(Duration::from_secs(21));
        cache.set(&key(CacheKind::Category, "toys", "yoyo"), products(1)).await;
        assert!(cache.shared_available());
        assert_eq!(shared.len(), 1);
    }

    #[tokio::test]
    async fn shared_tier_down_at_startup_is_picked_up_later() {
        let clock = Arc::new(ManualClock::default());
        let shared = Arc::new(MemorySharedTier::default());
        shared.set_online(false);
        let cache = TieredCache::with_clock(
            TieredCacheConfig::new().with_shared_retry(Duration::from_secs(5)),
            clock.clone(),
        )
        .with_shared_tier(shared.clone());
        assert!(!cache.check_shared_tier().await);

        shared.set_online(true);
        let k = key(CacheKind::Brand, "brand", "lego");
        cache.set(&k, products(2)).await;
        assert!(shared.is_empty());

        clock.advance(Duration::from_secs(5));
        cache.set(&k, products(2)).await;
        assert_eq!(shared.len(), 1);
        assert!(cache.stats().shared_available);
    }

    #[tokio::test]
    async fn invalidate_pattern_removes_matching_local_keys() {
        let cache = TieredCache::new(TieredCacheConfig::default());
        cache.set(&key(CacheKind::Category, "toys", "lego"), products(1)).await;
        cache.set(&key(CacheKind::Category, "toys", "puzzle"), products(1)).await;
        cache.set(&key(CacheKind::Category, "books", "lego"), products(1)).await;

        assert_eq!(cache.invalidate_pattern(":toys:"), 2);
        assert_eq!(cache.local_len(), 1);
        assert_eq!(cache.invalidate_pattern("nothing-matches"), 0);
    }

    #[tokio::test]
    async fn warm_fills_only_missing_keys() {
        let cache = TieredCache::new(TieredCacheConfig::default());
        let present = key(CacheKind::Category, "electronics", "");
        let missing = key(CacheKind::Category, "beauty", "");
        let failing = key(CacheKind::Category, "pets", "");
        cache.set(&present, products(1)).await;

        let calls = Arc::new(AtomicU64::new(0));
        let counter = calls.clone();
        let warmed = cache
            .warm(vec![present, missing.clone(), failing.clone()], move |k| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if k.category == "pets" {
                        Err(crate::Error::upstream("boom"))
                    } else {
                        Ok(products(2))
                    }
                }
            })
            .await;
        assert_eq!(warmed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.get(&missing).await.is_some());
        assert!(cache.get(&failing).await.is_none());
    }

    #[test]
    fn entry_validity() {
        let e = TieredEntry {
            data: vec![],
            created_at: 100.0,
            ttl_seconds: 10,
            version: 1,
        };
        assert!(e.is_valid(109.9, 1));
        assert!(!e.is_valid(110.0, 1));
        assert!(!e.is_valid(105.0, 2));
    }
}
