//! 分类路由模块：按分类键选择搜索方法与兜底查询，失败时降级而不抛错。
//!
//! # Category Routing
//!
//! Category browsing goes through a fixed strategy table instead of the
//! free-text orchestrator:
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CategoryKey`] | Supported categories; unknown input resolves to `Default` |
//! | [`CategoryStrategy`] | Search method, fallback query and active flag per category |
//! | [`CategorySearcher`] | Executes a [`SearchMethod`]; [`MeteredCategorySearcher`] bills the upstream |
//! | [`CategoryStrategyRegistry`] | Primary attempt, one fallback attempt, tiered caching |
//!
//! The registry never raises: a search that fails both attempts ends in the
//! `Failed` state with an empty result and an `error` marker.

mod category;
mod registry;
mod searcher;

pub use category::{strategies, CategoryKey, CategoryStrategy, SearchMethod};
pub use registry::{CategorySearchResult, CategoryStrategyRegistry, SearchState};
pub use searcher::{CategorySearcher, MeteredCategorySearcher};
