//! 使用学习模块：跨会话记录查询热度与成功率，用于缓存预热和降级决策。
//!
//! # Usage Learner
//!
//! Keeps one [`PopularityRecord`] per normalized query: how often it is asked,
//! when it was last seen, and an exponential moving average of whether it
//! produced results. State lives in a [`KeyValueStore`] so it survives
//! restarts; writes are throttled to one per `persist_interval`.

mod store;

pub use store::{FileStore, KeyValueStore, MemoryStore};

use crate::query::normalize;
use crate::utils::{Clock, SystemClock};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const STATE_VERSION: u32 = 1;
const DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularityRecord {
    pub query: String,
    pub count: u64,
    /// Seconds since the Unix epoch.
    pub last_seen_at: f64,
    /// Moving average in `[0, 1]`.
    pub success_rate: f64,
}

impl PopularityRecord {
    pub fn score(&self) -> f64 {
        self.count as f64 * self.success_rate
    }
}

#[derive(Debug, Clone)]
pub struct LearnerConfig {
    /// Partitions persisted state, e.g. per user or per deployment.
    pub scope: String,
    pub retention: Duration,
    pub popular_window: Duration,
    pub persist_interval: Duration,
    /// Weight of the newest observation in the success-rate average.
    pub ema_weight: f64,
    pub max_records: usize,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            scope: "default".to_string(),
            retention: Duration::from_secs(30 * DAY),
            popular_window: Duration::from_secs(7 * DAY),
            persist_interval: Duration::from_secs(30),
            ema_weight: 0.2,
            max_records: 5000,
        }
    }
}

impl LearnerConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }
    pub fn with_persist_interval(mut self, d: Duration) -> Self {
        self.persist_interval = d;
        self
    }
    pub fn with_retention(mut self, d: Duration) -> Self {
        self.retention = d;
        self
    }
    pub fn with_popular_window(mut self, d: Duration) -> Self {
        self.popular_window = d;
        self
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    version: u32,
    records: Vec<PopularityRecord>,
}

pub struct UsageLearner {
    config: LearnerConfig,
    records: Mutex<HashMap<String, PopularityRecord>>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    dirty: AtomicBool,
    last_persist: Mutex<Instant>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl UsageLearner {
    /// Build a learner and reload its state. An unreadable or corrupt store
    /// starts the learner empty instead of failing.
    pub async fn load(config: LearnerConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self::load_with_clock(config, store, Arc::new(SystemClock)).await
    }

    pub async fn load_with_clock(
        config: LearnerConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let learner = Self {
            config,
            records: Mutex::new(HashMap::new()),
            store,
            clock,
            dirty: AtomicBool::new(false),
            last_persist: Mutex::new(Instant::now()),
            persist_lock: tokio::sync::Mutex::new(()),
        };
        let key = learner.storage_key();
        match learner.store.load(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(state) if state.version == STATE_VERSION => {
                    if let Ok(mut records) = learner.records.lock() {
                        for r in state.records {
                            records.insert(r.query.clone(), r);
                        }
                    }
                    let pruned = learner.prune();
                    info!(scope = %learner.config.scope, records = learner.len(), pruned, "usage learner state loaded");
                }
                Ok(state) => {
                    warn!(found = state.version, expected = STATE_VERSION, "discarding usage learner state with unknown version")
                }
                Err(e) => warn!(error = %e, "discarding corrupt usage learner state"),
            },
            Ok(None) => debug!(scope = %learner.config.scope, "no persisted usage learner state"),
            Err(e) => warn!(store = learner.store.name(), error = %e, "usage learner store unavailable, starting empty"),
        }
        learner
    }

    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    pub fn storage_key(&self) -> String {
        format!("usage-learner:{}", self.config.scope)
    }

    /// Update the record in memory without touching the store.
    pub fn observe(&self, raw_query: &str, succeeded: bool, result_count: usize) {
        let key = normalize(raw_query);
        if key.is_empty() {
            return;
        }
        let observation = if succeeded && result_count > 0 { 1.0 } else { 0.0 };
        let weight = self.config.ema_weight;
        let now = self.clock.now();
        let Ok(mut records) = self.records.lock() else {
            return;
        };
        let record = records.entry(key.clone()).or_insert_with(|| PopularityRecord {
            query: key,
            count: 0,
            last_seen_at: now,
            // Optimistic prior: unknown queries are assumed to succeed.
            success_rate: 1.0,
        });
        record.count += 1;
        record.last_seen_at = now;
        record.success_rate = (1.0 - weight) * record.success_rate + weight * observation;
        self.dirty.store(true, Ordering::Release);
    }

    /// Record an outcome and persist if the throttle window has passed.
    pub async fn record_outcome(&self, raw_query: &str, succeeded: bool, result_count: usize) {
        self.observe(raw_query, succeeded, result_count);
        self.maybe_persist().await;
    }

    /// Unknown queries are optimistic (`true`); known ones need a success rate above 0.5.
    pub fn is_likely_successful(&self, raw_query: &str) -> bool {
        let key = normalize(raw_query);
        self.records
            .lock()
            .ok()
            .and_then(|r| r.get(&key).map(|rec| rec.success_rate > 0.5))
            .unwrap_or(true)
    }

    pub fn get(&self, raw_query: &str) -> Option<PopularityRecord> {
        let key = normalize(raw_query);
        self.records.lock().ok()?.get(&key).cloned()
    }

    /// Records seen within the popular window, ranked by `count * success_rate`.
    pub fn popular_queries(&self, limit: usize) -> Vec<PopularityRecord> {
        let cutoff = self.clock.now() - self.config.popular_window.as_secs_f64();
        let Ok(records) = self.records.lock() else {
            return Vec::new();
        };
        let mut recent: Vec<PopularityRecord> = records
            .values()
            .filter(|r| r.last_seen_at >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.query.cmp(&b.query))
        });
        recent.truncate(limit);
        recent
    }

    /// Drop records older than the retention window, then the stalest records
    /// beyond `max_records`. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let cutoff = self.clock.now() - self.config.retention.as_secs_f64();
        let Ok(mut records) = self.records.lock() else {
            return 0;
        };
        let before = records.len();
        records.retain(|_, r| r.last_seen_at >= cutoff);
        if records.len() > self.config.max_records {
            let mut by_age: Vec<(String, f64)> = records
                .iter()
                .map(|(k, r)| (k.clone(), r.last_seen_at))
                .collect();
            by_age.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(CmpOrdering::Equal));
            let excess = records.len() - self.config.max_records;
            for (k, _) in by_age.into_iter().take(excess) {
                records.remove(&k);
            }
        }
        let removed = before - records.len();
        if removed > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    async fn maybe_persist(&self) {
        if !self.persist_due() {
            return;
        }
        let _serialized_writes = self.persist_lock.lock().await;
        // a concurrent caller may have written while we waited for the lock
        if !self.persist_due() {
            return;
        }
        if let Err(e) = self.write_state().await {
            warn!(store = self.store.name(), error = %e, "failed to persist usage learner state");
        }
    }

    fn persist_due(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
            && self
                .last_persist
                .lock()
                .map(|last| last.elapsed() >= self.config.persist_interval)
                .unwrap_or(false)
    }

    /// Write the current state to the store now.
    pub async fn flush(&self) -> Result<()> {
        let _serialized_writes = self.persist_lock.lock().await;
        self.write_state().await
    }

    /// Callers hold `persist_lock`.
    async fn write_state(&self) -> Result<()> {
        self.prune();
        let payload = {
            let records = match self.records.lock() {
                Ok(r) => r,
                Err(_) => return Ok(()),
            };
            let state = PersistedState {
                version: STATE_VERSION,
                records: records.values().cloned().collect(),
            };
            serde_json::to_vec(&state)?
        };
        self.dirty.store(false, Ordering::Release);
        if let Ok(mut last) = self.last_persist.lock() {
            *last = Instant::now();
        }
        if let Err(e) = self.store.save(&self.storage_key(), &payload).await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!(scope = %self.config.scope, bytes = payload.len(), "usage learner state persisted");
        Ok(())
    }

    /// Flush pending changes. Call before dropping the learner.
    pub async fn close(&self) -> Result<()> {
        if self.dirty.load(Ordering::Acquire) {
            self.flush().await?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingStore {
        inner: MemoryStore,
        saves: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                saves: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl KeyValueStore for CountingStore {
        async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(crate::Error::storage_with_context("down", Default::default()));
            }
            self.inner.load(key).await
        }
        async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(crate::Error::storage_with_context("down", Default::default()));
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(key, value).await
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    async fn learner(store: Arc<dyn KeyValueStore>, clock: Arc<ManualClock>) -> UsageLearner {
        UsageLearner::load_with_clock(LearnerConfig::default(), store, clock).await
    }

    #[tokio::test]
    async fn success_rate_is_a_moving_average() {
        let clock = Arc::new(ManualClock::default());
        let l = learner(Arc::new(MemoryStore::new()), clock).await;

        l.observe("Teddy Bear", false, 0);
        let r = l.get("teddy bear").unwrap();
        assert_eq!(r.count, 1);
        assert!((r.success_rate - 0.8).abs() < 1e-9);

        l.observe("teddy bear", true, 0); // success without results counts as a miss
        assert!((l.get("teddy bear").unwrap().success_rate - 0.64).abs() < 1e-9);

        l.observe("teddy bear", true, 4);
        assert!((l.get("teddy bear").unwrap().success_rate - 0.712).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unknown_queries_are_optimistic() {
        let clock = Arc::new(ManualClock::default());
        let l = learner(Arc::new(MemoryStore::new()), clock).await;
        assert!(l.is_likely_successful("never seen"));

        for _ in 0..4 {
            l.observe("dud", false, 0);
        }
        // 0.8^4 = 0.4096
        assert!(!l.is_likely_successful("dud"));
        l.observe("hit", true, 3);
        assert!(l.is_likely_successful("HIT"));
    }

    #[tokio::test]
    async fn popular_queries_use_recent_window_and_score() {
        let clock = Arc::new(ManualClock::default());
        let l = learner(Arc::new(MemoryStore::new()), clock.clone()).await;

        for _ in 0..10 {
            l.observe("old favourite", true, 5);
        }
        clock.advance(Duration::from_secs(8 * DAY));
        for _ in 0..3 {
            l.observe("candles", true, 5);
        }
        for _ in 0..5 {
            l.observe("mugs", false, 0);
        }
        l.observe("scarf", true, 2);

        let popular: Vec<String> = l.popular_queries(10).into_iter().map(|r| r.query).collect();
        assert_eq!(popular, vec!["candles", "mugs", "scarf"]);
        // mugs: 5 * 0.8^5 ≈ 1.64 still beats scarf: 1 * 1.0
    }

    #[tokio::test(start_paused = true)]
    async fn writes_are_throttled() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(CountingStore::new());
        let l = learner(store.clone(), clock).await;

        l.record_outcome("gift", true, 3).await;
        l.record_outcome("gift", true, 3).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        l.record_outcome("gift", true, 3).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);

        l.record_outcome("gift", true, 3).await;
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);

        l.close().await.unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 2);
        l.close().await.unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 2, "clean learner does not rewrite");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_outcomes_share_one_write() {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(CountingStore::new());
        let l = Arc::new(learner(store.clone(), clock).await);
        tokio::time::advance(Duration::from_secs(31)).await;

        let writer = l.persist_lock.lock().await;
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let l = l.clone();
                tokio::spawn(async move { l.record_outcome(&format!("gift {i}"), true, 2).await })
            })
            .collect();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        drop(writer);
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert_eq!(l.len(), 5);
    }

    #[tokio::test]
    async fn state_survives_restart_and_is_pruned() {
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let first = learner(store.clone(), clock.clone()).await;
        first.observe("ancient", true, 1);
        clock.advance(Duration::from_secs(20 * DAY));
        first.observe("recent", true, 1);
        first.observe("recent", true, 1);
        first.flush().await.unwrap();

        clock.advance(Duration::from_secs(15 * DAY));
        let second = learner(store, clock).await;
        assert!(second.get("ancient").is_none(), "older than 30 days");
        assert_eq!(second.get("recent").unwrap().count, 2);
    }

    #[tokio::test]
    async fn scopes_are_isolated() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = UsageLearner::load(LearnerConfig::new().with_scope("alice"), store.clone()).await;
        a.observe("watch", true, 1);
        a.flush().await.unwrap();

        let b = UsageLearner::load(LearnerConfig::new().with_scope("bob"), store).await;
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn unavailable_store_degrades_to_empty() {
        let store = Arc::new(CountingStore::new());
        store.fail.store(true, Ordering::SeqCst);
        let l = learner(store.clone(), Arc::new(ManualClock::default())).await;
        assert!(l.is_empty());
        l.observe("gift", true, 1);
        assert!(l.flush().await.is_err());
        store.fail.store(false, Ordering::SeqCst);
        l.close().await.unwrap();
        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_state_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        store.save("usage-learner:default", b"not json").await.unwrap();
        let l = learner(store, Arc::new(ManualClock::default())).await;
        assert!(l.is_empty());
    }
}
