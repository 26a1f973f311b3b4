use super::{UpstreamResponse, UpstreamSearch};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, RateLimiter, RateLimiterConfig,
    RateLimiterSnapshot,
};
use crate::types::ProductRecord;
use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct GuardedUpstreamConfig {
    pub timeout: Duration,
    pub breaker: CircuitBreakerConfig,
    /// Unset means no client-side rate limit.
    pub requests_per_second: Option<f64>,
}

impl Default for GuardedUpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(8000),
            breaker: CircuitBreakerConfig::default(),
            requests_per_second: None,
        }
    }
}

impl GuardedUpstreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_rate_limit(mut self, rps: f64) -> Self {
        self.requests_per_second = Some(rps);
        self
    }
}

/// Facts about the upstream, for [`SearchClient::signals`](crate::client::SearchClient::signals).
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamSnapshot {
    pub name: &'static str,
    /// Calls that reached the provider (billed or not).
    pub calls: u64,
    pub failures: u64,
    /// Calls refused locally by the breaker or the rate limiter.
    pub rejected: u64,
    pub circuit_breaker: CircuitBreakerSnapshot,
    pub rate_limiter: Option<RateLimiterSnapshot>,
}

/// The metered upstream with its guards.
///
/// A call is refused locally (never reaching the provider) when the breaker is
/// open or the rate limiter has no token. Timeouts, transport errors and
/// responses carrying an `error` marker all count as breaker failures.
pub struct GuardedUpstream {
    inner: Arc<dyn UpstreamSearch>,
    config: GuardedUpstreamConfig,
    breaker: CircuitBreaker,
    rate_limiter: Option<RateLimiter>,
    calls: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
}

impl GuardedUpstream {
    pub fn new(inner: Arc<dyn UpstreamSearch>, config: GuardedUpstreamConfig) -> Self {
        let breaker = CircuitBreaker::new(inner.name(), config.breaker.clone());
        let rate_limiter = config
            .requests_per_second
            .and_then(RateLimiterConfig::from_rps)
            .map(RateLimiter::new);
        Self {
            inner,
            config,
            breaker,
            rate_limiter,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn config(&self) -> &GuardedUpstreamConfig {
        &self.config
    }

    /// Perform one billed search. `Ok` may still be empty.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<ProductRecord>> {
        if let Err(e) = self.breaker.allow() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        if let Some(limiter) = &self.rate_limiter {
            if !limiter.try_acquire().await {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(Error::Upstream {
                    message: "client-side rate limit reached".to_string(),
                    context: ErrorContext::new()
                        .with_source(self.name())
                        .with_details(format!("query: {query}")),
                });
            }
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        let outcome = match tokio::time::timeout(
            self.config.timeout,
            self.inner.raw_search(query, max_results),
        )
        .await
        {
            Err(_) => Err(Error::Timeout {
                operation: format!("{}.raw_search", self.name()),
                after_ms: self.config.timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(UpstreamResponse {
                error: Some(message),
                ..
            })) => Err(Error::Upstream {
                message,
                context: ErrorContext::new().with_source(self.name()),
            }),
            Ok(Ok(UpstreamResponse {
                results,
                error: None,
            })) => Ok(results),
        };

        match &outcome {
            Ok(results) => {
                self.breaker.on_success();
                debug!(upstream = self.name(), query, results = results.len(), "upstream call completed");
            }
            Err(e) => {
                self.breaker.on_failure();
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(upstream = self.name(), query, error = %e, "upstream call failed");
            }
        }
        outcome
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> UpstreamSnapshot {
        let rate_limiter = match &self.rate_limiter {
            Some(limiter) => Some(limiter.snapshot().await),
            None => None,
        };
        UpstreamSnapshot {
            name: self.name(),
            calls: self.calls(),
            failures: self.failures(),
            rejected: self.rejected.load(Ordering::Relaxed),
            circuit_breaker: self.breaker.snapshot(),
            rate_limiter,
        }
    }
}
