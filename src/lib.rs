//! # gift-search
//!
//! 礼品电商的搜索成本优化层：在按次计费的商品搜索接口之前，用缓存、请求合并、预算闸门和使用学习减少付费调用。
//!
//! Search-cost optimization layer for a gifting marketplace. Every call to the
//! upstream product-search API is billed, so this crate decides when a call
//! is worth making and serves cached or local data whenever it is not.
//!
//! ## Core Philosophy
//!
//! - **Never fail the caller**: `search` and `search_category` always return a
//!   (possibly empty, possibly fallback) result list
//! - **Pay once per question**: exact and fuzzy caching, synonym expansion and
//!   request coalescing keep duplicate questions off the meter
//! - **Hard spend cap**: a monthly budget gate with atomic reservations
//! - **Explicit services**: every component is constructed and injected, with
//!   an explicit `close` where it owns background work
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gift_search::upstream::InMemoryUpstream;
//! use gift_search::{OptimizerConfig, SearchClientBuilder};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> gift_search::Result<()> {
//!     let client = SearchClientBuilder::new()
//!         .with_config(OptimizerConfig::from_env()?)
//!         .with_upstream(Arc::new(InMemoryUpstream::new()))
//!         .build()
//!         .await?;
//!
//!     let results = client.search("wireless headphones", 10).await;
//!     println!("{} results", results.len());
//!
//!     client.close().await
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`query`] | Normalization, similarity, synonym expansion |
//! | [`cache`] | Fuzzy result cache and two-tier category cache |
//! | [`coalesce`] | In-flight request deduplication with cooldown |
//! | [`budget`] | Monthly spend cap on metered calls |
//! | [`learning`] | Cross-session query popularity and success rates |
//! | [`upstream`] | Metered upstream seam, guards, local catalog |
//! | [`search`] | Free-text search orchestration policy |
//! | [`routing`] | Category strategy table and registry |
//! | [`client`] | Builder-wired facade and runtime signals |
//! | [`config`] | YAML configuration |
//! | [`resilience`] | Circuit breaker and rate limiter |

pub mod budget;
pub mod cache;
pub mod client;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod learning;
pub mod query;
pub mod resilience;
pub mod routing;
pub mod search;
pub mod types;
pub mod upstream;
pub mod utils;

// Re-export main types for convenience
pub use budget::{BudgetGate, Money};
pub use cache::{ResultCache, TieredCache};
pub use client::{SearchClient, SearchClientBuilder, SearchSignals};
pub use coalesce::{CooldownPolicy, RequestCoalescer};
pub use config::OptimizerConfig;
pub use error::{Error, ErrorContext};
pub use learning::UsageLearner;
pub use routing::{CategoryKey, CategorySearchResult, CategoryStrategyRegistry};
pub use search::{ResultSource, SearchOrchestrator, SearchResponse};
pub use types::{ProductRecord, SearchOptions};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
