//! 上游模块：计费搜索接口、带熔断/超时/限流的保护层，以及本地兜底商品目录。
//!
//! # Upstream
//!
//! The metered product-search API is an external collaborator; this module
//! only defines the seam and what we wrap around it.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`UpstreamSearch`] | One billed call: `raw_search(query, max_results)` |
//! | [`GuardedUpstream`] | Timeout, circuit breaker, optional rate limit, call counters |
//! | [`InMemoryUpstream`] | Deterministic stand-in used by the simulator and tests |
//! | [`LocalCatalog`] / [`StaticCatalog`] | Free local data served as mock or fallback results |

mod catalog;
mod guarded;
mod memory;

pub use catalog::{LocalCatalog, StaticCatalog};
pub use guarded::{GuardedUpstream, GuardedUpstreamConfig, UpstreamSnapshot};
pub use memory::InMemoryUpstream;

use crate::types::ProductRecord;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the provider hands back. A populated `error` means the call failed
/// even if the transport succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamResponse {
    #[serde(default)]
    pub results: Vec<ProductRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpstreamResponse {
    pub fn ok(results: Vec<ProductRecord>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// The metered search call. The budget gate only books the cost when a call
/// returns at least one result; failed and empty calls are released.
#[async_trait]
pub trait UpstreamSearch: Send + Sync {
    async fn raw_search(&self, query: &str, max_results: usize) -> Result<UpstreamResponse>;

    fn name(&self) -> &'static str {
        "upstream"
    }
}
