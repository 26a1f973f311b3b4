use crate::budget::BudgetSnapshot;
use crate::cache::{ResultCacheStats, TieredCacheStats};
use crate::coalesce::CoalescerSnapshot;
use crate::upstream::UpstreamSnapshot;
use serde::Serialize;

/// A facts-only snapshot of the optimizer's runtime state.
///
/// No policy lives here; dashboards and tests build on top of it.
#[derive(Debug, Clone, Serialize)]
pub struct SearchSignals {
    pub result_cache: ResultCacheStats,
    pub tiered_cache: TieredCacheStats,
    pub budget: BudgetSnapshot,
    pub coalescer: CoalescerSnapshot,
    pub upstream: UpstreamSnapshot,
    pub learned_queries: usize,
}
