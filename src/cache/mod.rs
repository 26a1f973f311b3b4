//! 缓存模块：模糊匹配结果缓存与两级（本地 + 共享）分类缓存。
//!
//! # Caching Module
//!
//! Two caches sit in front of the metered product-search API:
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResultCache`] | Normalized query → results, exact + fuzzy lookup, popularity eviction |
//! | [`TieredCache`] | Local LRU + optional shared tier for category and brand searches |
//! | [`SharedTier`] | Trait for the shared (remote) tier; [`MemorySharedTier`] for tests |
//! | [`TieredKey`] | Composite `{kind, category, term, options hash}` key |
//! | [`TtlPolicy`] | Per-class TTL selection for the tiered cache |
//!
//! ## Example
//!
//! ```rust
//! use gift_search::cache::{ResultCache, ResultCacheConfig};
//! use gift_search::types::ProductRecord;
//!
//! let cache = ResultCache::new(ResultCacheConfig::default());
//! cache.set("Blue Shoes", vec![ProductRecord::new("sku-1", "Blue canvas shoes")]);
//! assert!(cache.get("blue   shoes").is_some());
//! assert!(cache.get("blue shoe").is_some()); // fuzzy
//! ```

mod backend;
mod key;
mod policy;
mod result;
mod tiered;

pub use backend::{MemorySharedTier, SharedTier};
pub use key::{options_hash, CacheKind, TieredKey};
pub use policy::TtlPolicy;
pub use result::{
    CacheHit, EntrySnapshot, HitKind, ResultCache, ResultCacheConfig, ResultCacheStats,
};
pub use tiered::{
    TieredCache, TieredCacheConfig, TieredCacheStats, TieredEntry, CACHE_FORMAT_VERSION,
};
