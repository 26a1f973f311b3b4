//! TTL classes for the tiered cache.

use super::key::CacheKind;
use crate::query::normalize;
use std::collections::HashSet;
use std::time::Duration;

/// TTL selection by search kind and category popularity.
///
/// | Class | Default |
/// |-------|---------|
/// | popular category | 15 min |
/// | brand search | 45 min |
/// | generic search results | 30 min |
/// | any other category | 1 h |
/// | fallback data | 4 h |
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    pub popular: Duration,
    pub brand: Duration,
    pub search: Duration,
    pub default: Duration,
    pub fallback: Duration,
    popular_categories: HashSet<String>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            popular: Duration::from_secs(15 * 60),
            brand: Duration::from_secs(45 * 60),
            search: Duration::from_secs(30 * 60),
            default: Duration::from_secs(60 * 60),
            fallback: Duration::from_secs(4 * 60 * 60),
            popular_categories: ["electronics", "fashion", "beauty", "home_decor"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl TtlPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_popular_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.popular_categories = categories
            .into_iter()
            .map(|c| normalize(c.as_ref()))
            .collect();
        self
    }

    pub fn is_popular(&self, category: &str) -> bool {
        self.popular_categories.contains(&normalize(category))
    }

    pub fn popular_categories(&self) -> impl Iterator<Item = &str> {
        self.popular_categories.iter().map(String::as_str)
    }

    pub fn ttl_for(&self, kind: CacheKind, category: &str) -> Duration {
        match kind {
            CacheKind::Fallback => self.fallback,
            CacheKind::Brand => self.brand,
            CacheKind::Search => self.search,
            CacheKind::Category if self.is_popular(category) => self.popular,
            CacheKind::Category => self.default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_classes() {
        let p = TtlPolicy::default();
        assert_eq!(p.ttl_for(CacheKind::Category, "Electronics"), Duration::from_secs(900));
        assert_eq!(p.ttl_for(CacheKind::Category, "books"), Duration::from_secs(3600));
        assert_eq!(p.ttl_for(CacheKind::Brand, "electronics"), Duration::from_secs(2700));
        assert_eq!(p.ttl_for(CacheKind::Search, "books"), Duration::from_secs(1800));
        assert_eq!(p.ttl_for(CacheKind::Fallback, "electronics"), Duration::from_secs(14400));
    }

    #[test]
    fn popular_set_is_configurable() {
        let p = TtlPolicy::new().with_popular_categories(["Books"]);
        assert!(p.is_popular("books"));
        assert!(!p.is_popular("electronics"));
    }
}
