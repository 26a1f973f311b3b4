//! 弹性模块：保护计费上游的熔断器与令牌桶限流器。
//!
//! # Resilience Primitives
//!
//! Guards wrapped around the metered upstream by
//! [`GuardedUpstream`](crate::upstream::GuardedUpstream):
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Stops calling an upstream that keeps failing, for a cooldown |
//! | [`rate_limiter`] | Token bucket that keeps us under the provider's request rate |
//!
//! An open breaker or an empty bucket never surfaces to search callers: the
//! orchestrator treats both like an upstream failure and serves local data.

pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
