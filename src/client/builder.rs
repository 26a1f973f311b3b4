use crate::budget::BudgetGate;
use crate::cache::{ResultCache, SharedTier, TieredCache};
use crate::client::core::SearchClient;
use crate::coalesce::RequestCoalescer;
use crate::config::OptimizerConfig;
use crate::learning::{FileStore, KeyValueStore, MemoryStore, UsageLearner};
use crate::routing::{CategorySearcher, CategoryStrategyRegistry, MeteredCategorySearcher};
use crate::search::SearchOrchestrator;
use crate::upstream::{GuardedUpstream, LocalCatalog, StaticCatalog, UpstreamSearch};
use crate::utils::{Clock, SystemClock};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Builder for [`SearchClient`].
///
/// Only the upstream is mandatory; everything else has a local default.
pub struct SearchClientBuilder {
    config: OptimizerConfig,
    upstream: Option<Arc<dyn UpstreamSearch>>,
    catalog: Option<Arc<dyn LocalCatalog>>,
    store: Option<Arc<dyn KeyValueStore>>,
    shared_tier: Option<Arc<dyn SharedTier>>,
    clock: Option<Arc<dyn Clock>>,
    category_searcher: Option<Arc<dyn CategorySearcher>>,
    background_tasks: bool,
}

impl SearchClientBuilder {
    pub fn new() -> Self {
        Self {
            config: OptimizerConfig::default(),
            upstream: None,
            catalog: None,
            store: None,
            shared_tier: None,
            clock: None,
            category_searcher: None,
            background_tasks: true,
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// The metered search API.
    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamSearch>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Local mock/fallback data. Default: the built-in [`StaticCatalog`].
    pub fn with_catalog(mut self, catalog: Arc<dyn LocalCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Where the usage learner persists. Default: `learner.store_dir` if
    /// configured, otherwise in memory.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_shared_tier(mut self, tier: Arc<dyn SharedTier>) -> Self {
        self.shared_tier = Some(tier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the metered category searcher.
    pub fn with_category_searcher(mut self, searcher: Arc<dyn CategorySearcher>) -> Self {
        self.category_searcher = Some(searcher);
        self
    }

    /// Disable the periodic sweep and warm tasks (useful in tests).
    pub fn without_background_tasks(mut self) -> Self {
        self.background_tasks = false;
        self
    }

    /// Build the client. Must run inside a Tokio runtime.
    pub async fn build(self) -> Result<SearchClient> {
        let config = self.config;
        config.validate()?;

        let upstream = self.upstream.ok_or_else(|| {
            Error::configuration("an upstream search implementation is required", "upstream")
        })?;
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(StaticCatalog::builtin()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn KeyValueStore> = match (self.store, &config.learner.store_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::new(dir)),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let cache = Arc::new(ResultCache::new(config.result_cache_config()));
        let coalescer = Arc::new(RequestCoalescer::new(config.coalescer_config()));
        let budget = Arc::new(BudgetGate::new(config.budget_config()));
        let learner = Arc::new(
            UsageLearner::load_with_clock(config.learner_config(), store, clock.clone()).await,
        );
        let upstream = Arc::new(GuardedUpstream::new(upstream, config.upstream_config()));

        let orchestrator = Arc::new(SearchOrchestrator::new(
            config.search_config(),
            cache,
            coalescer,
            budget.clone(),
            learner,
            upstream.clone(),
            catalog.clone(),
        ));

        let mut tiered = TieredCache::with_clock(config.tiered_config(), clock);
        if let Some(tier) = self.shared_tier {
            tiered = tiered.with_shared_tier(tier);
        }
        let tiered = Arc::new(tiered);
        tiered.check_shared_tier().await;

        let searcher = self.category_searcher.unwrap_or_else(|| {
            Arc::new(MeteredCategorySearcher::new(
                upstream.clone(),
                budget,
                catalog.clone(),
            ))
        });
        let registry = Arc::new(CategoryStrategyRegistry::new(searcher, tiered, catalog));

        let client = SearchClient::new(orchestrator, registry);
        if self.background_tasks {
            if let Some(every) = config.sweep_interval() {
                client.spawn_sweep(every);
            }
            if let Some(every) = config.warm_interval() {
                client.spawn_warmer(every);
            }
        }
        info!(
            upstream = upstream.name(),
            monthly_limit = %config.budget.monthly_limit,
            "search client ready"
        );
        Ok(client)
    }
}

impl Default for SearchClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
