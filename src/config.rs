//! 配置模块：从 YAML 加载整个优化层的配置，并转换为各组件的类型化配置。
//!
//! # Configuration
//!
//! One YAML document configures every component. All fields are optional;
//! missing ones take the defaults below.
//!
//! ```yaml
//! result_cache: { ttl_secs: 3600, max_entries: 1000, fuzzy_threshold: 0.8 }
//! coalescer: { debounce_ms: 300, cooldown_ms: 5000, cooldown_policy: reuse_last }
//! budget: { monthly_limit: 50.0, cost_per_call: 0.10 }
//! learner: { scope: default, persist_interval_secs: 30 }
//! tiered: { local_capacity: 512, popular_categories: [electronics, fashion] }
//! search: { high_confidence_terms: [headphones], synonyms: { gift: [present] } }
//! upstream: { timeout_ms: 8000, failure_threshold: 5, requests_per_second: 2.0 }
//! ```
//!
//! [`OptimizerConfig::from_env`] reads the file named by `GIFT_SEARCH_CONFIG`.

use crate::budget::{BudgetConfig, Money};
use crate::cache::{ResultCacheConfig, TieredCacheConfig, TtlPolicy, CACHE_FORMAT_VERSION};
use crate::coalesce::{CoalescerConfig, CooldownPolicy};
use crate::learning::LearnerConfig;
use crate::query::SynonymTable;
use crate::resilience::CircuitBreakerConfig;
use crate::search::SearchConfig;
use crate::upstream::GuardedUpstreamConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "GIFT_SEARCH_CONFIG";

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub result_cache: ResultCacheSection,
    pub coalescer: CoalescerSection,
    pub budget: BudgetSection,
    pub learner: LearnerSection,
    pub tiered: TieredSection,
    pub search: SearchSection,
    pub upstream: UpstreamSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultCacheSection {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub fuzzy_threshold: f64,
    pub eviction_target_ratio: f64,
    /// Background purge of expired entries; 0 disables it.
    pub sweep_interval_secs: u64,
    /// Fraction of the TTL after which warming re-fetches a popular entry.
    pub refresh_ratio: f64,
}

impl Default for ResultCacheSection {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 1000,
            fuzzy_threshold: 0.8,
            eviction_target_ratio: 0.8,
            sweep_interval_secs: 300,
            refresh_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoalescerSection {
    pub debounce_ms: u64,
    pub cooldown_ms: u64,
    pub cooldown_policy: CooldownPolicy,
}

impl Default for CoalescerSection {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            cooldown_ms: 5000,
            cooldown_policy: CooldownPolicy::default(),
        }
    }
}

/// Amounts in dollars.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    pub monthly_limit: Money,
    pub cost_per_call: Money,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            monthly_limit: Money::from_dollars(50.0),
            cost_per_call: Money::from_dollars(0.10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerSection {
    pub scope: String,
    pub retention_days: u64,
    pub popular_window_days: u64,
    pub persist_interval_secs: u64,
    pub ema_weight: f64,
    pub max_records: usize,
    /// Directory for a file-backed store; unset keeps learner state in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<String>,
}

impl Default for LearnerSection {
    fn default() -> Self {
        Self {
            scope: "default".to_string(),
            retention_days: 30,
            popular_window_days: 7,
            persist_interval_secs: 30,
            ema_weight: 0.2,
            max_records: 5000,
            store_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TieredSection {
    pub local_capacity: usize,
    pub version: u32,
    pub popular_categories: Vec<String>,
    pub popular_ttl_secs: u64,
    pub brand_ttl_secs: u64,
    pub search_ttl_secs: u64,
    pub default_ttl_secs: u64,
    pub fallback_ttl_secs: u64,
    /// Periodic warming of popular categories and queries; 0 disables it.
    pub warm_interval_secs: u64,
    /// Seconds before an unreachable shared tier is pinged again.
    pub shared_retry_secs: u64,
}

impl Default for TieredSection {
    fn default() -> Self {
        Self {
            local_capacity: 512,
            version: CACHE_FORMAT_VERSION,
            popular_categories: ["electronics", "fashion", "beauty", "home_decor"]
                .into_iter()
                .map(String::from)
                .collect(),
            popular_ttl_secs: 900,
            brand_ttl_secs: 2700,
            search_ttl_secs: 1800,
            default_ttl_secs: 3600,
            fallback_ttl_secs: 14400,
            warm_interval_secs: 0,
            shared_retry_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub high_confidence_terms: Vec<String>,
    /// Extra synonyms merged over the built-in table.
    pub synonyms: HashMap<String, Vec<String>>,
    pub max_expansions: usize,
    pub min_fetch_results: usize,
    pub mock_accept_floor: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        let defaults = SearchConfig::default();
        Self {
            high_confidence_terms: defaults.high_confidence_terms,
            synonyms: HashMap::new(),
            max_expansions: 3,
            min_fetch_results: defaults.min_fetch_results,
            mock_accept_floor: defaults.mock_accept_floor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    pub timeout_ms: u64,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_second: Option<f64>,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            timeout_ms: 8000,
            failure_threshold: 5,
            cooldown_secs: 30,
            requests_per_second: None,
        }
    }
}

fn invalid(message: impl Into<String>, field: &str, value: impl ToString) -> Error {
    Error::Configuration {
        message: message.into(),
        context: ErrorContext::new()
            .with_field_path(field)
            .with_details(format!("value: {}", value.to_string())),
    }
}

fn check_ratio(value: f64, field: &str) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid("must be in (0, 1]", field, value));
    }
    Ok(())
}

fn check_positive(value: u64, field: &str) -> Result<()> {
    if value == 0 {
        return Err(invalid("must be greater than zero", field, value));
    }
    Ok(())
}

impl OptimizerConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
            message: format!("failed to read config: {e}"),
            context: ErrorContext::new()
                .with_source("config")
                .with_details(path.display().to_string()),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load from `GIFT_SEARCH_CONFIG` if set, otherwise the defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let rc = &self.result_cache;
        check_positive(rc.ttl_secs, "result_cache.ttl_secs")?;
        check_positive(rc.max_entries as u64, "result_cache.max_entries")?;
        check_ratio(rc.fuzzy_threshold, "result_cache.fuzzy_threshold")?;
        check_ratio(rc.eviction_target_ratio, "result_cache.eviction_target_ratio")?;
        check_ratio(rc.refresh_ratio, "result_cache.refresh_ratio")?;

        if self.budget.cost_per_call == Money::ZERO {
            return Err(invalid(
                "must be greater than zero",
                "budget.cost_per_call",
                self.budget.cost_per_call,
            ));
        }

        let l = &self.learner;
        if l.scope.trim().is_empty() {
            return Err(invalid("must not be empty", "learner.scope", "''"));
        }
        check_positive(l.retention_days, "learner.retention_days")?;
        check_positive(l.popular_window_days, "learner.popular_window_days")?;
        check_ratio(l.ema_weight, "learner.ema_weight")?;
        check_positive(l.max_records as u64, "learner.max_records")?;

        check_positive(self.tiered.local_capacity as u64, "tiered.local_capacity")?;

        let u = &self.upstream;
        check_positive(u.timeout_ms, "upstream.timeout_ms")?;
        check_positive(u64::from(u.failure_threshold), "upstream.failure_threshold")?;
        if let Some(rps) = u.requests_per_second {
            if !(rps.is_finite() && rps > 0.0) {
                return Err(invalid(
                    "must be a positive number",
                    "upstream.requests_per_second",
                    rps,
                ));
            }
        }
        Ok(())
    }

    pub fn result_cache_config(&self) -> ResultCacheConfig {
        let s = &self.result_cache;
        ResultCacheConfig::new()
            .with_ttl(Duration::from_secs(s.ttl_secs))
            .with_max_entries(s.max_entries)
            .with_fuzzy_threshold(s.fuzzy_threshold)
            .with_eviction_target_ratio(s.eviction_target_ratio)
            .with_refresh_ratio(s.refresh_ratio)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.result_cache.sweep_interval_secs > 0)
            .then(|| Duration::from_secs(self.result_cache.sweep_interval_secs))
    }

    pub fn coalescer_config(&self) -> CoalescerConfig {
        let s = &self.coalescer;
        CoalescerConfig::new()
            .with_debounce(Duration::from_millis(s.debounce_ms))
            .with_cooldown(Duration::from_millis(s.cooldown_ms))
            .with_cooldown_policy(s.cooldown_policy)
    }

    pub fn budget_config(&self) -> BudgetConfig {
        BudgetConfig::new()
            .with_monthly_limit(self.budget.monthly_limit)
            .with_cost_per_call(self.budget.cost_per_call)
    }

    pub fn learner_config(&self) -> LearnerConfig {
        let s = &self.learner;
        LearnerConfig {
            scope: s.scope.clone(),
            retention: Duration::from_secs(s.retention_days * DAY_SECS),
            popular_window: Duration::from_secs(s.popular_window_days * DAY_SECS),
            persist_interval: Duration::from_secs(s.persist_interval_secs),
            ema_weight: s.ema_weight,
            max_records: s.max_records,
        }
    }

    pub fn tiered_config(&self) -> TieredCacheConfig {
        let s = &self.tiered;
        let mut ttl = TtlPolicy::new().with_popular_categories(&s.popular_categories);
        ttl.popular = Duration::from_secs(s.popular_ttl_secs);
        ttl.brand = Duration::from_secs(s.brand_ttl_secs);
        ttl.search = Duration::from_secs(s.search_ttl_secs);
        ttl.default = Duration::from_secs(s.default_ttl_secs);
        ttl.fallback = Duration::from_secs(s.fallback_ttl_secs);
        TieredCacheConfig::new()
            .with_local_capacity(s.local_capacity)
            .with_version(s.version)
            .with_ttl_policy(ttl)
            .with_shared_retry(Duration::from_secs(s.shared_retry_secs))
    }

    pub fn warm_interval(&self) -> Option<Duration> {
        (self.tiered.warm_interval_secs > 0)
            .then(|| Duration::from_secs(self.tiered.warm_interval_secs))
    }

    pub fn search_config(&self) -> SearchConfig {
        let s = &self.search;
        let mut synonyms = SynonymTable::builtin().with_max_expansions(s.max_expansions);
        synonyms.extend(&s.synonyms);
        SearchConfig::new()
            .with_high_confidence_terms(&s.high_confidence_terms)
            .with_synonyms(synonyms)
            .with_min_fetch_results(s.min_fetch_results)
            .with_mock_accept_floor(s.mock_accept_floor)
    }

    pub fn upstream_config(&self) -> GuardedUpstreamConfig {
        let s = &self.upstream;
        let mut config = GuardedUpstreamConfig::new()
            .with_timeout(Duration::from_millis(s.timeout_ms))
            .with_breaker(
                CircuitBreakerConfig::new()
                    .with_failure_threshold(s.failure_threshold)
                    .with_cooldown(Duration::from_secs(s.cooldown_secs)),
            );
        if let Some(rps) = s.requests_per_second {
            config = config.with_rate_limit(rps);
        }
        config
    }
}
