use super::{CategoryKey, CategorySearcher, CategoryStrategy, SearchMethod};
use crate::cache::{CacheKind, TieredCache, TieredKey};
use crate::types::{ProductRecord, SearchOptions};
use crate::upstream::LocalCatalog;
use crate::Error;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress of one `execute_search` call.
///
/// `NotStarted → PrimaryAttempt → (Success | FallbackAttempt → (Success | Failed))`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    NotStarted,
    PrimaryAttempt,
    FallbackAttempt,
    Success,
    Failed,
}

impl SearchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SearchState::Success | SearchState::Failed)
    }
}

/// Outcome of a category or brand search. Always returned, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct CategorySearchResult {
    pub category: CategoryKey,
    pub results: Vec<ProductRecord>,
    pub state: SearchState,
    pub used_fallback: bool,
    pub from_cache: bool,
    /// Set only in the `Failed` state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CategorySearchResult {
    fn success(category: CategoryKey, results: Vec<ProductRecord>, used_fallback: bool) -> Self {
        Self {
            category,
            results,
            state: SearchState::Success,
            used_fallback,
            from_cache: false,
            error: None,
        }
    }

    fn cached(category: CategoryKey, results: Vec<ProductRecord>, used_fallback: bool) -> Self {
        Self {
            from_cache: true,
            ..Self::success(category, results, used_fallback)
        }
    }

    fn failed(category: CategoryKey, error: &Error) -> Self {
        Self {
            category,
            results: Vec::new(),
            state: SearchState::Failed,
            used_fallback: true,
            from_cache: false,
            error: Some(error.to_string()),
        }
    }
}

/// Category routing over the static strategy table, cached in a [`TieredCache`].
pub struct CategoryStrategyRegistry {
    searcher: Arc<dyn CategorySearcher>,
    tiered: Arc<TieredCache>,
    catalog: Arc<dyn LocalCatalog>,
}

impl CategoryStrategyRegistry {
    pub fn new(
        searcher: Arc<dyn CategorySearcher>,
        tiered: Arc<TieredCache>,
        catalog: Arc<dyn LocalCatalog>,
    ) -> Self {
        Self {
            searcher,
            tiered,
            catalog,
        }
    }

    pub fn tiered(&self) -> &Arc<TieredCache> {
        &self.tiered
    }

    pub fn strategy_for(&self, category: &str) -> &'static CategoryStrategy {
        CategoryKey::parse(category).strategy()
    }

    fn cache_key(key: CategoryKey, term: &str, options: &SearchOptions) -> TieredKey {
        let kind = if key == CategoryKey::Default && !term.trim().is_empty() {
            CacheKind::Search
        } else {
            CacheKind::Category
        };
        TieredKey::new(kind, key.as_str(), term, options)
    }

    /// Search `category` for `term`. An unknown category uses the default strategy.
    pub async fn execute_search(
        &self,
        category: &str,
        term: &str,
        options: &SearchOptions,
    ) -> CategorySearchResult {
        let strategy = self.strategy_for(category);
        let key = strategy.key;
        let primary_key = Self::cache_key(key, term, options);
        let fallback_key = primary_key.with_kind(CacheKind::Fallback);

        if let Some(entry) = self.tiered.get(&primary_key).await {
            return CategorySearchResult::cached(key, entry.data, false);
        }
        if let Some(entry) = self.tiered.get(&fallback_key).await {
            return CategorySearchResult::cached(key, entry.data, true);
        }

        let mut state = SearchState::NotStarted;
        let primary_error = if strategy.is_active {
            state = transition(key, state, SearchState::PrimaryAttempt);
            match self.searcher.search(strategy.method, term, options).await {
                Ok(results) => {
                    transition(key, state, SearchState::Success);
                    if !results.is_empty() {
                        self.tiered.set(&primary_key, results.clone()).await;
                    }
                    return CategorySearchResult::success(key, results, false);
                }
                Err(e) => Some(e),
            }
        } else {
            debug!(category = %key, "category strategy inactive, skipping primary attempt");
            None
        };

        if let Some(Error::BudgetExhausted { .. }) = &primary_error {
            let limit = options.limit_or(20);
            let local = self
                .catalog
                .fallback(&strategy.method.compose(term), limit);
            info!(category = %key, "budget exhausted, serving local catalog for category");
            return CategorySearchResult::success(key, options.apply_price_filter(local), true);
        }

        if let Some(e) = &primary_error {
            if key == CategoryKey::Default {
                warn!(category = %key, error = %e, "default category search failed");
                transition(key, state, SearchState::Failed);
                return CategorySearchResult::failed(key, e);
            }
            warn!(category = %key, error = %e, "primary category search failed, trying fallback query");
        }

        state = transition(key, state, SearchState::FallbackAttempt);
        match self
            .searcher
            .search(SearchMethod::Default, strategy.fallback_query, options)
            .await
        {
            Ok(results) => {
                transition(key, state, SearchState::Success);
                if !results.is_empty() {
                    self.tiered.set(&fallback_key, results.clone()).await;
                }
                CategorySearchResult::success(key, results, true)
            }
            Err(e) => {
                warn!(category = %key, error = %e, "fallback category search failed");
                transition(key, state, SearchState::Failed);
                CategorySearchResult::failed(key, &e)
            }
        }
    }

    /// Brand search, cached in the brand TTL class.
    pub async fn search_brand(
        &self,
        brand: &str,
        term: &str,
        options: &SearchOptions,
    ) -> CategorySearchResult {
        let brand = brand.trim();
        let term = term.trim();
        let query = if term.is_empty() {
            brand.to_string()
        } else {
            format!("{brand} {term}")
        };
        let options = options.clone().with_brand(brand);
        let key = TieredKey::new(CacheKind::Brand, "brand", &query, &options);

        if let Some(entry) = self.tiered.get(&key).await {
            return CategorySearchResult::cached(CategoryKey::Default, entry.data, false);
        }
        match self
            .searcher
            .search(SearchMethod::Default, &query, &options)
            .await
        {
            Ok(results) => {
                if !results.is_empty() {
                    self.tiered.set(&key, results.clone()).await;
                }
                CategorySearchResult::success(CategoryKey::Default, results, false)
            }
            Err(e) => {
                warn!(brand, error = %e, "brand search failed");
                CategorySearchResult::failed(CategoryKey::Default, &e)
            }
        }
    }

    /// Prefetch the popular categories (no search term) into the tiered cache.
    /// Returns how many were written.
    pub async fn warm_popular_categories(&self) -> usize {
        let options = SearchOptions::default();
        let seeds: Vec<TieredKey> = self
            .tiered
            .config()
            .ttl
            .popular_categories()
            .map(CategoryKey::parse)
            .filter(|key| *key != CategoryKey::Default)
            .map(|key| Self::cache_key(key, "", &options))
            .collect();
        let searcher = &self.searcher;
        let options = &options;
        let warmed = self
            .tiered
            .warm(seeds, |seed| async move {
                let strategy = CategoryKey::parse(&seed.category).strategy();
                searcher.search(strategy.method, "", options).await
            })
            .await;
        info!(warmed, "popular categories warmed");
        warmed
    }
}

fn transition(key: CategoryKey, from: SearchState, to: SearchState) -> SearchState {
    debug!(category = %key, ?from, ?to, "category search state");
    to
}
