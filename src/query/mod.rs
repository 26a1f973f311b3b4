//! 查询模块：查询规范化、编辑距离相似度与同义词扩展。
//!
//! # Query Module
//!
//! Everything that turns raw user input into cache keys.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`normalize`] | Canonical cache key: lower-cased, punctuation-stripped, whitespace-collapsed |
//! | [`similarity`] | Normalized Levenshtein similarity in `[0, 1]` |
//! | [`SynonymTable`] | Query expansion used before falling through to the upstream |
//!
//! ```rust
//! use gift_search::query::{normalize, similarity};
//!
//! assert_eq!(normalize("  Blue   Shoes!! "), "blue shoes");
//! assert!(similarity("sneakers", "sneaker") >= 0.8);
//! ```

mod similarity;
mod synonyms;

pub use similarity::{levenshtein, similarity};
pub use synonyms::SynonymTable;

use once_cell::sync::Lazy;
use regex::Regex;

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Canonicalize a raw query into the key used by every cache and by the coalescer.
///
/// Idempotent: `normalize(&normalize(q)) == normalize(q)`.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let stripped = PUNCTUATION.replace_all(&lowered, "");
    let collapsed = WHITESPACE.replace_all(stripped.trim(), " ");
    collapsed.trim().to_string()
}
