//! Category and brand routing through the client's tiered cache.

use async_trait::async_trait;
use gift_search::routing::SearchState;
use gift_search::upstream::{InMemoryUpstream, UpstreamResponse, UpstreamSearch};
use gift_search::{
    CategoryKey, Money, OptimizerConfig, ProductRecord, SearchClient, SearchClientBuilder,
    SearchOptions,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fails any query containing `broken`, answers everything else.
struct PartialOutage {
    broken: &'static str,
    calls: AtomicU64,
}

#[async_trait]
impl UpstreamSearch for PartialOutage {
    async fn raw_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> gift_search::Result<UpstreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if query.contains(self.broken) {
            return Ok(UpstreamResponse::failed("provider rejected the query"));
        }
        Ok(UpstreamResponse::ok(
            (0..max_results.min(4))
                .map(|i| ProductRecord::new(format!("{query}-{i}"), format!("{query} #{i}")))
                .collect(),
        ))
    }
}

async fn build(upstream: Arc<dyn UpstreamSearch>) -> SearchClient {
    SearchClientBuilder::new()
        .with_upstream(upstream)
        .without_background_tasks()
        .build()
        .await
        .expect("client builds")
}

#[tokio::test]
async fn scoped_category_hits_upstream_then_tier() {
    let upstream = Arc::new(InMemoryUpstream::new());
    let client = build(upstream.clone()).await;
    let options = SearchOptions::new().with_max_results(5);

    let first = client.execute_category("Electronics", "smart watch", &options).await;
    assert_eq!(first.category, CategoryKey::Electronics);
    assert_eq!(first.state, SearchState::Success);
    assert!(!first.used_fallback);
    assert!(!first.from_cache);
    assert_eq!(first.results.len(), 5);
    assert_eq!(upstream.calls(), 1);

    let second = client.execute_category("electronics", "smart watch", &options).await;
    assert!(second.from_cache);
    assert_eq!(second.results, first.results);
    assert_eq!(upstream.calls(), 1);
    assert_eq!(
        client.orchestrator().budget().spent(),
        Money::from_dollars(0.10)
    );
}

#[tokio::test]
async fn failed_primary_retries_with_fallback_query() {
    let upstream = Arc::new(PartialOutage {
        broken: "electronics gadgets",
        calls: AtomicU64::new(0),
    });
    let client = build(upstream.clone()).await;

    let result = client
        .execute_category("electronics", "drone", &SearchOptions::default())
        .await;
    assert_eq!(result.state, SearchState::Success);
    assert!(result.used_fallback);
    assert!(result
        .results
        .iter()
        .all(|r| r.title.starts_with("popular tech gadgets")));
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
    // only the successful fallback call is charged
    assert_eq!(
        client.orchestrator().budget().spent(),
        Money::from_dollars(0.10)
    );
}

#[tokio::test]
async fn total_outage_reports_failure_marker() {
    let upstream = Arc::new(InMemoryUpstream::new());
    upstream.fail_with("maintenance window");
    let client = build(upstream).await;

    let result = client
        .execute_category("fashion", "", &SearchOptions::default())
        .await;
    assert_eq!(result.state, SearchState::Failed);
    assert!(result.results.is_empty());
    assert!(result.error.is_some());
    assert_eq!(client.orchestrator().budget().spent(), Money::ZERO);
}

#[tokio::test]
async fn curated_category_uses_local_catalog_for_free() {
    let upstream = Arc::new(InMemoryUpstream::new());
    let client = build(upstream.clone()).await;

    let results = client
        .search_category("experiences", "", &SearchOptions::default())
        .await;
    assert!(!results.is_empty());
    assert_eq!(upstream.calls(), 0);
    assert_eq!(client.orchestrator().budget().spent(), Money::ZERO);
}

#[tokio::test]
async fn exhausted_budget_serves_catalog_for_categories() {
    let upstream = Arc::new(InMemoryUpstream::new());
    let client = build(upstream.clone()).await;
    client
        .orchestrator()
        .budget()
        .restore_spent(Money::from_dollars(50.0));

    let result = client
        .execute_category("electronics", "headphones", &SearchOptions::default())
        .await;
    assert_eq!(result.state, SearchState::Success);
    assert!(result.used_fallback);
    assert!(!result.results.is_empty());
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn brand_search_is_cached() {
    let upstream = Arc::new(InMemoryUpstream::new());
    let client = build(upstream.clone()).await;
    let options = SearchOptions::new().with_max_results(3);

    let first = client.search_brand("Acme", "kettle", &options).await;
    let second = client.search_brand("Acme", "kettle", &options).await;
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn warming_prefetches_popular_categories() {
    let upstream = Arc::new(InMemoryUpstream::new());
    let client = build(upstream.clone()).await;

    let report = client.warm_cache(10).await;
    assert_eq!(report.categories_warmed, 4);

    let calls = upstream.calls();
    let result = client
        .execute_category("beauty", "", &SearchOptions::default())
        .await;
    assert!(result.from_cache);
    assert_eq!(upstream.calls(), calls);
}
