//! Tiered cache key generation.

use crate::query::normalize;
use crate::types::SearchOptions;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const KEY_NAMESPACE: &str = "gs";

/// What kind of search produced a tiered cache entry; selects the TTL class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Search,
    Category,
    Brand,
    Fallback,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Search => "search",
            CacheKind::Category => "category",
            CacheKind::Brand => "brand",
            CacheKind::Fallback => "fallback",
        }
    }
}

/// Composite key `{kind, category, term, options hash}` shared by both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TieredKey {
    pub kind: CacheKind,
    pub category: String,
    pub term: String,
    pub options_hash: String,
    rendered: String,
}

impl TieredKey {
    pub fn new(kind: CacheKind, category: &str, term: &str, options: &SearchOptions) -> Self {
        let category = normalize(category);
        let term = normalize(term);
        let options_hash = options_hash(options);
        let rendered = format!(
            "{KEY_NAMESPACE}:{}:{category}:{term}:{options_hash}",
            kind.as_str()
        );
        Self {
            kind,
            category,
            term,
            options_hash,
            rendered,
        }
    }

    /// Same coordinates, different kind (e.g. caching a fallback answer under its own TTL class).
    pub fn with_kind(&self, kind: CacheKind) -> Self {
        let rendered = format!(
            "{KEY_NAMESPACE}:{}:{}:{}:{}",
            kind.as_str(),
            self.category,
            self.term,
            self.options_hash
        );
        Self {
            kind,
            rendered,
            ..self.clone()
        }
    }

    pub fn as_str(&self) -> &str {
        &self.rendered
    }
}

impl std::fmt::Display for TieredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.rendered)
    }
}

/// First 16 hex chars of the SHA-256 of the canonical JSON of `options`.
pub fn options_hash(options: &SearchOptions) -> String {
    let canonical = serde_json::to_string(options).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().iter().take(8).map(|b| format!("{:02x}", b)).collect()
}
