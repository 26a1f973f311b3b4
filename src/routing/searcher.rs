use super::SearchMethod;
use crate::budget::BudgetGate;
use crate::types::{ProductRecord, SearchOptions};
use crate::upstream::{GuardedUpstream, LocalCatalog};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Executes one category search attempt. Errors trigger the registry's
/// fallback attempt.
#[async_trait]
pub trait CategorySearcher: Send + Sync {
    async fn search(
        &self,
        method: SearchMethod,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ProductRecord>>;
}

/// Category searches against the metered upstream, each billed through the
/// shared [`BudgetGate`]. Curated methods read the local catalog instead.
pub struct MeteredCategorySearcher {
    upstream: Arc<GuardedUpstream>,
    budget: Arc<BudgetGate>,
    catalog: Arc<dyn LocalCatalog>,
    default_limit: usize,
}

impl MeteredCategorySearcher {
    pub fn new(
        upstream: Arc<GuardedUpstream>,
        budget: Arc<BudgetGate>,
        catalog: Arc<dyn LocalCatalog>,
    ) -> Self {
        Self {
            upstream,
            budget,
            catalog,
            default_limit: 20,
        }
    }

    /// Result limit used when the caller's options leave it unset.
    pub fn with_default_limit(mut self, n: usize) -> Self {
        self.default_limit = n.max(1);
        self
    }
}

#[async_trait]
impl CategorySearcher for MeteredCategorySearcher {
    async fn search(
        &self,
        method: SearchMethod,
        term: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ProductRecord>> {
        let query = method.compose(term);
        if query.is_empty() {
            return Err(Error::validation_with_context(
                "category search needs a term or category keywords",
                ErrorContext::new().with_source("category_searcher"),
            ));
        }
        let limit = options.limit_or(self.default_limit);

        if !method.is_metered() {
            return Ok(options.apply_price_filter(self.catalog.search(&query, limit)));
        }

        let Some(reservation) = self.budget.try_reserve() else {
            let snap = self.budget.snapshot();
            return Err(Error::BudgetExhausted {
                limit: snap.monthly_limit.to_string(),
                spent: snap.spent.to_string(),
            });
        };
        match self.upstream.search(&query, limit).await {
            Ok(results) => {
                if results.is_empty() {
                    reservation.release();
                } else {
                    reservation.commit();
                }
                debug!(query = %query, results = results.len(), "category search completed");
                let mut results = options.apply_price_filter(results);
                results.truncate(limit);
                Ok(results)
            }
            Err(e) => {
                reservation.release();
                Err(e)
            }
        }
    }
}
