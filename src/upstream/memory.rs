use super::{UpstreamResponse, UpstreamSearch};
use crate::query::normalize;
use crate::types::ProductRecord;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// An upstream that never leaves the process.
///
/// By default every query gets `results_per_query` synthetic products named
/// after it; fixed answers can be registered per normalized query. Counts
/// calls so tests can assert how often the "billed" path ran.
pub struct InMemoryUpstream {
    fixed: Mutex<HashMap<String, Vec<ProductRecord>>>,
    results_per_query: usize,
    latency: Option<Duration>,
    failure: Mutex<Option<String>>,
    calls: AtomicU64,
}

impl Default for InMemoryUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUpstream {
    pub fn new() -> Self {
        Self {
            fixed: Mutex::new(HashMap::new()),
            results_per_query: 10,
            latency: None,
            failure: Mutex::new(None),
            calls: AtomicU64::new(0),
        }
    }

    /// Zero makes every unregistered query come back empty.
    pub fn with_results_per_query(mut self, n: usize) -> Self {
        self.results_per_query = n;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_fixed(self, query: &str, results: Vec<ProductRecord>) -> Self {
        self.insert_fixed(query, results);
        self
    }

    pub fn insert_fixed(&self, query: &str, results: Vec<ProductRecord>) {
        if let Ok(mut fixed) = self.fixed.lock() {
            fixed.insert(normalize(query), results);
        }
    }

    /// Make every following call return an `error` marker.
    pub fn fail_with(&self, message: impl Into<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.into());
        }
    }

    pub fn recover(&self) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = None;
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn synthesize(&self, query: &str, max_results: usize) -> Vec<ProductRecord> {
        let slug: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        (0..self.results_per_query.min(max_results))
            .map(|i| {
                ProductRecord::new(format!("mem-{slug}-{i}"), format!("{query} option {}", i + 1))
                    .with_price(15.0 + 5.0 * i as f64)
                    .with_merchant("In-memory marketplace")
            })
            .collect()
    }
}

#[async_trait]
impl UpstreamSearch for InMemoryUpstream {
    async fn raw_search(&self, query: &str, max_results: usize) -> Result<UpstreamResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Ok(UpstreamResponse::failed(message));
        }
        let key = normalize(query);
        let registered = self
            .fixed
            .lock()
            .ok()
            .and_then(|fixed| fixed.get(&key).cloned());
        let mut results = match registered {
            Some(results) => results,
            None => self.synthesize(&key, max_results),
        };
        results.truncate(max_results);
        Ok(UpstreamResponse::ok(results))
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn synthesizes_and_counts() {
        let up = InMemoryUpstream::new();
        let resp = up.raw_search("Asdkjhqwe123", 4).await.unwrap();
        assert_eq!(resp.results.len(), 4);
        assert_eq!(resp.results[0].title, "asdkjhqwe123 option 1");
        assert_eq!(up.calls(), 1);
    }

    #[tokio::test]
    async fn fixed_answers_and_failures() {
        let up = InMemoryUpstream::new()
            .with_results_per_query(0)
            .with_fixed("Red Scarf", vec![ProductRecord::new("s1", "Red wool scarf")]);
        assert_eq!(up.raw_search("red scarf!", 10).await.unwrap().results.len(), 1);
        assert!(up.raw_search("other", 10).await.unwrap().results.is_empty());

        up.fail_with("boom");
        let resp = up.raw_search("red scarf", 10).await.unwrap();
        assert_eq!(resp.error.as_deref(), Some("boom"));
    }
}
