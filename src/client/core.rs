use crate::client::signals::SearchSignals;
use crate::routing::{CategorySearchResult, CategoryStrategyRegistry};
use crate::search::{SearchOrchestrator, SearchResponse};
use crate::types::{ProductRecord, SearchOptions};
use crate::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Popular queries considered by each periodic warming pass.
const WARM_QUERY_LIMIT: usize = 20;

/// What a [`SearchClient::warm_cache`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub queries_considered: usize,
    pub queries_fetched: usize,
    pub categories_warmed: usize,
}

/// Caller-facing search surface. Every search method is total: failures come
/// back as fallback data (or, for categories, an error marker), never as `Err`.
pub struct SearchClient {
    orchestrator: Arc<SearchOrchestrator>,
    registry: Arc<CategoryStrategyRegistry>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SearchClient {
    pub(crate) fn new(
        orchestrator: Arc<SearchOrchestrator>,
        registry: Arc<CategoryStrategyRegistry>,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn builder() -> crate::client::SearchClientBuilder {
        crate::client::SearchClientBuilder::new()
    }

    pub fn orchestrator(&self) -> &Arc<SearchOrchestrator> {
        &self.orchestrator
    }

    pub fn registry(&self) -> &Arc<CategoryStrategyRegistry> {
        &self.registry
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Vec<ProductRecord> {
        self.orchestrator.search(query, max_results).await
    }

    pub async fn search_detailed(&self, query: &str, max_results: usize) -> SearchResponse {
        self.orchestrator.search_detailed(query, max_results).await
    }

    pub async fn search_category(
        &self,
        category: &str,
        term: &str,
        options: &SearchOptions,
    ) -> Vec<ProductRecord> {
        self.registry
            .execute_search(category, term, options)
            .await
            .results
    }

    /// Category search with its terminal state, fallback flag and error marker.
    pub async fn execute_category(
        &self,
        category: &str,
        term: &str,
        options: &SearchOptions,
    ) -> CategorySearchResult {
        self.registry.execute_search(category, term, options).await
    }

    pub async fn search_brand(
        &self,
        brand: &str,
        term: &str,
        options: &SearchOptions,
    ) -> Vec<ProductRecord> {
        self.registry.search_brand(brand, term, options).await.results
    }

    /// Re-fetch popular queries that are missing from the result cache or close
    /// to expiry, then prefetch the popular categories into the tiered cache.
    pub async fn warm_cache(&self, limit: usize) -> WarmReport {
        warm(&self.orchestrator, &self.registry, limit).await
    }

    pub async fn signals(&self) -> SearchSignals {
        let o = &self.orchestrator;
        SearchSignals {
            result_cache: o.cache().stats(),
            tiered_cache: self.registry.tiered().stats(),
            budget: o.budget().snapshot(),
            coalescer: o.coalescer().snapshot(),
            upstream: o.upstream().snapshot().await,
            learned_queries: o.learner().len(),
        }
    }

    pub(crate) fn spawn_sweep(&self, every: Duration) {
        let cache = self.orchestrator.cache().clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!(removed, "expired result cache entries swept");
                }
            }
        });
        self.track(handle);
    }

    pub(crate) fn spawn_warmer(&self, every: Duration) {
        let orchestrator = self.orchestrator.clone();
        let registry = self.registry.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                warm(&orchestrator, &registry, WARM_QUERY_LIMIT).await;
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        } else {
            handle.abort();
        }
    }

    /// Stop background tasks and flush learner state.
    pub async fn close(&self) -> Result<()> {
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .map(|mut tasks| tasks.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            handle.abort();
        }
        self.orchestrator.learner().close().await?;
        info!("search client closed");
        Ok(())
    }
}

impl Drop for SearchClient {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for handle in tasks.drain(..) {
                handle.abort();
            }
        }
    }
}

async fn warm(
    orchestrator: &SearchOrchestrator,
    registry: &CategoryStrategyRegistry,
    limit: usize,
) -> WarmReport {
    let mut seen = HashSet::new();
    let seeds: Vec<String> = orchestrator
        .learner()
        .popular_queries(limit)
        .into_iter()
        .map(|r| r.query)
        .chain(
            orchestrator
                .cache()
                .get_popular_queries(limit)
                .into_iter()
                .map(|e| e.query),
        )
        .filter(|q| seen.insert(q.clone()))
        .collect();

    let mut report = WarmReport {
        queries_considered: seeds.len(),
        ..Default::default()
    };
    let cache = orchestrator.cache();
    let fetch = orchestrator.config().min_fetch_results;
    for query in seeds {
        let due = match cache.peek(&query) {
            Some(entry) => cache.needs_refresh(&entry),
            None => true,
        };
        if !due {
            continue;
        }
        let source = orchestrator.refresh(&query, fetch).await;
        debug!(query = %query, ?source, "warmed popular query");
        report.queries_fetched += 1;
    }
    report.categories_warmed = registry.warm_popular_categories().await;
    info!(
        considered = report.queries_considered,
        fetched = report.queries_fetched,
        categories = report.categories_warmed,
        "cache warming pass finished"
    );
    report
}
