//! Product records and search options.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A result set as cached and fanned out to coalesced waiters.
///
/// Order is significant: it is the order the upstream (or catalog) returned.
pub type SharedResults = Arc<Vec<ProductRecord>>;

/// One product, already cleaned up by the upstream adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl ProductRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            price: None,
            currency: default_currency(),
            url: None,
            image_url: None,
            merchant: None,
            brand: None,
            category: None,
            rating: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_rating(mut self, rating: f32) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Options accepted by category and brand searches.
///
/// Serialized (field order is stable) to derive the options hash of a tiered cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = Some(n);
        self
    }

    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    pub fn with_brand(mut self, brand: impl Into<String>) -> Self {
        self.brand = Some(brand.into());
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Effective result limit, falling back to `default` when unset.
    pub fn limit_or(&self, default: usize) -> usize {
        self.max_results.unwrap_or(default)
    }

    /// Drop records outside the requested price range. Records without a
    /// price are kept.
    pub fn apply_price_filter(&self, results: Vec<ProductRecord>) -> Vec<ProductRecord> {
        if self.min_price.is_none() && self.max_price.is_none() {
            return results;
        }
        results
            .into_iter()
            .filter(|p| match p.price {
                Some(price) => {
                    self.min_price.map_or(true, |min| price >= min)
                        && self.max_price.map_or(true, |max| price <= max)
                }
                None => true,
            })
            .collect()
    }
}
