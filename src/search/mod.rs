//! 搜索编排模块：把结果缓存、请求合并、预算闸门、使用学习与计费上游组合成一个入口。
//!
//! # Search Orchestrator
//!
//! [`SearchOrchestrator::search`] is the free-text entry point. It never
//! returns an error; every failure turns into local data.
//!
//! Policy, in order:
//!
//! 1. Try the normalized query and a few synonym expansions against the
//!    [`ResultCache`] (exact, then fuzzy). Any hit is returned immediately.
//! 2. Otherwise resolve once per in-flight query through the
//!    [`RequestCoalescer`]:
//!    - no budget left: serve the local catalog, uncached;
//!    - high-confidence term, or a query the [`UsageLearner`] expects to
//!      fail upstream: serve the local catalog if it has enough matches;
//!    - else call the metered upstream. Non-empty results are charged and
//!      cached; empty results or failures fall back to the catalog, which is
//!      cached in their place.
//! 3. Record the outcome with the learner.

mod config;

pub use config::SearchConfig;

use crate::budget::BudgetGate;
use crate::cache::{HitKind, ResultCache};
use crate::coalesce::RequestCoalescer;
use crate::learning::UsageLearner;
use crate::query::normalize;
use crate::types::{ProductRecord, SharedResults};
use crate::upstream::{GuardedUpstream, LocalCatalog};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Result cache hit, exact or fuzzy.
    Cache,
    /// Fresh, billed upstream results.
    Upstream,
    /// Local catalog chosen instead of the upstream.
    LocalCatalog,
    /// Local data after the upstream failed or came back empty.
    Fallback,
    /// Local data because the monthly budget is exhausted.
    BudgetFallback,
    /// Empty answer from the coalescer cooldown, or an empty query.
    #[default]
    Suppressed,
}

/// The value shared by every caller of one coalesced resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub results: SharedResults,
    pub source: ResultSource,
}

impl Resolution {
    fn new(results: Vec<ProductRecord>, source: ResultSource) -> Self {
        Self {
            results: Arc::new(results),
            source,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// The normalized query.
    pub query: String,
    pub results: Vec<ProductRecord>,
    pub source: ResultSource,
}

pub struct SearchOrchestrator {
    config: SearchConfig,
    cache: Arc<ResultCache>,
    coalescer: Arc<RequestCoalescer<Resolution>>,
    budget: Arc<BudgetGate>,
    learner: Arc<UsageLearner>,
    upstream: Arc<GuardedUpstream>,
    catalog: Arc<dyn LocalCatalog>,
}

impl SearchOrchestrator {
    pub fn new(
        config: SearchConfig,
        cache: Arc<ResultCache>,
        coalescer: Arc<RequestCoalescer<Resolution>>,
        budget: Arc<BudgetGate>,
        learner: Arc<UsageLearner>,
        upstream: Arc<GuardedUpstream>,
        catalog: Arc<dyn LocalCatalog>,
    ) -> Self {
        Self {
            config,
            cache,
            coalescer,
            budget,
            learner,
            upstream,
            catalog,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn coalescer(&self) -> &Arc<RequestCoalescer<Resolution>> {
        &self.coalescer
    }

    pub fn budget(&self) -> &Arc<BudgetGate> {
        &self.budget
    }

    pub fn learner(&self) -> &Arc<UsageLearner> {
        &self.learner
    }

    pub fn upstream(&self) -> &Arc<GuardedUpstream> {
        &self.upstream
    }

    /// Up to `max_results` products for `raw_query`. Never fails.
    pub async fn search(&self, raw_query: &str, max_results: usize) -> Vec<ProductRecord> {
        self.search_detailed(raw_query, max_results).await.results
    }

    pub async fn search_detailed(&self, raw_query: &str, max_results: usize) -> SearchResponse {
        let query = normalize(raw_query);
        if query.is_empty() {
            return SearchResponse {
                query,
                results: Vec::new(),
                source: ResultSource::Suppressed,
            };
        }

        for candidate in self.config.synonyms.expand(&query) {
            if let Some(hit) = self.cache.lookup(&candidate) {
                match &hit.kind {
                    HitKind::Exact => debug!(query = %query, key = %candidate, "result cache hit"),
                    HitKind::Fuzzy {
                        matched,
                        similarity,
                    } => debug!(query = %query, matched = %matched, similarity, "fuzzy result cache hit"),
                }
                self.learner
                    .record_outcome(&query, true, hit.results.len())
                    .await;
                return respond(query, &hit.results, ResultSource::Cache, max_results);
            }
        }

        let fetch = max_results.max(self.config.min_fetch_results);
        let accept_floor = self.config.mock_accept_floor.min(max_results);
        let resolution = self
            .coalescer
            .coalesced(&query, |key| self.resolve(key, fetch, accept_floor))
            .await
            .unwrap_or_else(|e| {
                warn!(query = %query, error = %e, "coalesced search did not complete, serving catalog");
                Resolution::new(self.catalog.fallback(&query, fetch), ResultSource::Fallback)
            });

        match resolution.source {
            ResultSource::Cache | ResultSource::Upstream | ResultSource::LocalCatalog => {
                self.learner
                    .record_outcome(&query, true, resolution.results.len())
                    .await
            }
            ResultSource::Fallback => self.learner.record_outcome(&query, false, 0).await,
            ResultSource::BudgetFallback | ResultSource::Suppressed => {}
        }
        respond(query, &resolution.results, resolution.source, max_results)
    }

    /// Resolve `raw_query` again without consulting the result cache, so a
    /// popular entry is re-fetched before it expires. Used by cache warming;
    /// nothing is recorded in the learner.
    pub async fn refresh(&self, raw_query: &str, max_results: usize) -> ResultSource {
        let query = normalize(raw_query);
        if query.is_empty() {
            return ResultSource::Suppressed;
        }
        let fetch = max_results.max(self.config.min_fetch_results);
        let accept_floor = self.config.mock_accept_floor.min(max_results);
        match self
            .coalescer
            .coalesced(&query, |key| self.resolve(key, fetch, accept_floor))
            .await
        {
            Ok(resolution) => resolution.source,
            Err(e) => {
                warn!(query = %query, error = %e, "cache refresh did not complete");
                ResultSource::Suppressed
            }
        }
    }

    /// Whether `normalized` contains one of the configured high-confidence terms as whole words.
    pub fn is_high_confidence(&self, normalized: &str) -> bool {
        let padded = format!(" {normalized} ");
        self.config
            .high_confidence_terms
            .iter()
            .any(|term| padded.contains(&format!(" {term} ")))
    }

    /// The coalesced body: runs at most once per in-flight query.
    async fn resolve(&self, key: String, fetch: usize, accept_floor: usize) -> Result<Resolution> {
        let Some(reservation) = self.budget.try_reserve() else {
            info!(query = %key, spent = %self.budget.spent(), "budget exhausted, serving local catalog");
            return Ok(Resolution::new(
                self.catalog.fallback(&key, fetch),
                ResultSource::BudgetFallback,
            ));
        };

        let high_confidence = self.is_high_confidence(&key);
        if high_confidence || !self.learner.is_likely_successful(&key) {
            let local = self.catalog.search(&key, fetch);
            if !local.is_empty() && local.len() >= accept_floor {
                reservation.release();
                debug!(query = %key, high_confidence, results = local.len(), "serving local catalog instead of upstream");
                self.cache.set(&key, local.clone());
                return Ok(Resolution::new(local, ResultSource::LocalCatalog));
            }
        }

        match self.upstream.search(&key, fetch).await {
            Ok(results) if !results.is_empty() => {
                reservation.commit();
                self.cache.set(&key, results.clone());
                Ok(Resolution::new(results, ResultSource::Upstream))
            }
            outcome => {
                reservation.release();
                match outcome {
                    Err(e) => warn!(query = %key, error = %e, "upstream failed, falling back to local catalog"),
                    Ok(_) => info!(query = %key, "upstream returned no results, falling back to local catalog"),
                }
                let fallback = self.catalog.fallback(&key, fetch);
                self.cache.set(&key, fallback.clone());
                Ok(Resolution::new(fallback, ResultSource::Fallback))
            }
        }
    }
}

fn respond(
    query: String,
    results: &SharedResults,
    source: ResultSource,
    max_results: usize,
) -> SearchResponse {
    SearchResponse {
        query,
        results: results.iter().take(max_results).cloned().collect(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetConfig, Money};
    use crate::cache::ResultCacheConfig;
    use crate::coalesce::{CoalescerConfig, CooldownPolicy};
    use crate::learning::{LearnerConfig, MemoryStore};
    use crate::upstream::{GuardedUpstreamConfig, InMemoryUpstream, StaticCatalog};

    struct Harness {
        orchestrator: Arc<SearchOrchestrator>,
        upstream: Arc<InMemoryUpstream>,
    }

    async fn harness(config: SearchConfig, coalescer: CoalescerConfig) -> Harness {
        let upstream = Arc::new(InMemoryUpstream::new());
        let learner = UsageLearner::load(LearnerConfig::default(), Arc::new(MemoryStore::new())).await;
        let orchestrator = SearchOrchestrator::new(
            config,
            Arc::new(ResultCache::new(ResultCacheConfig::default())),
            Arc::new(RequestCoalescer::new(coalescer)),
            Arc::new(BudgetGate::new(BudgetConfig::default())),
            Arc::new(learner),
            Arc::new(GuardedUpstream::new(upstream.clone(), GuardedUpstreamConfig::default())),
            Arc::new(StaticCatalog::builtin()),
        );
        Harness {
            orchestrator: Arc::new(orchestrator),
            upstream,
        }
    }

    async fn default_harness() -> Harness {
        harness(SearchConfig::default(), CoalescerConfig::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn miss_calls_upstream_charges_and_caches() {
        let h = default_harness().await;
        let o = &h.orchestrator;

        let resp = o.search_detailed("Asdkjhqwe123", 5).await;
        assert_eq!(resp.source, ResultSource::Upstream);
        assert_eq!(resp.results.len(), 5);
        assert_eq!(h.upstream.calls(), 1);
        assert_eq!(o.budget().spent(), Money::from_dollars(0.10));
        assert_eq!(o.cache().peek("asdkjhqwe123").unwrap().result_count, 10);

        let again = o.search_detailed("asdkjhqwe123!", 5).await;
        assert_eq!(again.source, ResultSource::Cache);
        assert_eq!(again.results, resp.results);
        assert_eq!(h.upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn synonym_expansion_finds_cached_results() {
        let h = default_harness().await;
        let o = &h.orchestrator;
        o.cache().set("present", vec![ProductRecord::new("p1", "Gift box")]);

        let resp = o.search_detailed("gift", 10).await;
        assert_eq!(resp.source, ResultSource::Cache);
        assert_eq!(resp.results[0].id, "p1");
        assert_eq!(h.upstream.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_serves_catalog_without_caching() {
        let h = default_harness().await;
        let o = &h.orchestrator;
        o.budget().restore_spent(Money::from_dollars(49.95));

        let resp = o.search_detailed("headphones", 10).await;
        assert_eq!(resp.source, ResultSource::BudgetFallback);
        assert!(!resp.results.is_empty());
        assert_eq!(o.budget().spent(), Money::from_dollars(49.95));
        assert_eq!(h.upstream.calls(), 0);
        assert!(o.cache().peek("headphones").is_none());
        assert!(o.learner().get("headphones").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn high_confidence_terms_skip_the_upstream() {
        let h = default_harness().await;
        let o = &h.orchestrator;
        let resp = o.search_detailed("wireless headphones", 10).await;
        assert_eq!(resp.source, ResultSource::LocalCatalog);
        assert!(resp.results.len() >= 5);
        assert_eq!(h.upstream.calls(), 0);
        assert_eq!(o.budget().spent(), Money::ZERO);
        assert!(o.cache().peek("wireless headphones").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn thin_local_coverage_still_goes_upstream() {
        let config = SearchConfig::default().with_high_confidence_terms(["candles"]);
        let h = harness(config, CoalescerConfig::default()).await;
        let resp = h.orchestrator.search_detailed("candles", 10).await;
        assert_eq!(resp.source, ResultSource::Upstream);
        assert_eq!(h.upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_falls_back_and_records_failure() {
        let h = default_harness().await;
        let o = &h.orchestrator;
        h.upstream.fail_with("503 service unavailable");

        let resp = o.search_detailed("scarf", 10).await;
        assert_eq!(resp.source, ResultSource::Fallback);
        assert!(!resp.results.is_empty());
        assert_eq!(o.budget().spent(), Money::ZERO);
        assert_eq!(o.cache().peek("scarf").unwrap().result_count, resp.results.len());
        let record = o.learner().get("scarf").unwrap();
        assert!((record.success_rate - 0.8).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_upstream_result_is_not_charged() {
        let h = default_harness().await;
        let o = &h.orchestrator;
        h.upstream.insert_fixed("zzqx", Vec::new());

        let resp = o.search_detailed("zzqx", 4).await;
        assert_eq!(resp.source, ResultSource::Fallback);
        assert_eq!(resp.results.len(), 4);
        assert_eq!(o.budget().spent(), Money::ZERO);
        assert_eq!(h.upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_searches_share_one_upstream_call() {
        let h = default_harness().await;
        let mut tasks = Vec::new();
        for _ in 0..10 {
            let o = h.orchestrator.clone();
            tasks.push(tokio::spawn(async move { o.search("gift", 10).await }));
        }
        let mut outputs = Vec::new();
        for t in tasks {
            outputs.push(t.await.unwrap());
        }
        assert_eq!(h.upstream.calls(), 1);
        assert!(outputs.iter().all(|o| *o == outputs[0]));
        assert_eq!(outputs[0].len(), 10);
        assert_eq!(h.orchestrator.budget().snapshot().calls_charged, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn learner_steers_poor_queries_to_the_catalog() {
        let h = default_harness().await;
        let o = &h.orchestrator;
        for _ in 0..4 {
            o.learner().observe("teddy bear plush", false, 0);
        }
        let resp = o.search_detailed("teddy bear plush", 1).await;
        assert_eq!(resp.source, ResultSource::LocalCatalog);
        assert_eq!(h.upstream.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn suppress_empty_cooldown_answers_nothing() {
        let coalescer = CoalescerConfig::default().with_cooldown_policy(CooldownPolicy::SuppressEmpty);
        let h = harness(SearchConfig::default(), coalescer).await;
        let o = &h.orchestrator;
        h.upstream.fail_with("down");
        let _ = o.search_detailed("scarf", 5).await;
        // The failure fallback is cached, so clear it to reach the coalescer.
        o.cache().clear();

        let resp = o.search_detailed("scarf", 5).await;
        assert_eq!(resp.source, ResultSource::Suppressed);
        assert!(resp.results.is_empty());
        assert_eq!(h.upstream.calls(), 1);
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let h = default_harness().await;
        let resp = h.orchestrator.search_detailed("  ?! ", 10).await;
        assert!(resp.results.is_empty());
        assert_eq!(h.upstream.calls(), 0);
    }
}
