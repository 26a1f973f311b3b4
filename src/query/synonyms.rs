//! Synonym-based query expansion.

use super::normalize;
use std::collections::HashMap;

/// Word-level synonym table used to try a few equivalent cache keys before
/// paying for an upstream call.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    words: HashMap<String, Vec<String>>,
    max_expansions: usize,
}

const BUILTIN: &[(&str, &[&str])] = &[
    ("gift", &["present"]),
    ("present", &["gift"]),
    ("headphones", &["earbuds", "headset"]),
    ("earbuds", &["headphones"]),
    ("headset", &["headphones"]),
    ("sneakers", &["trainers", "shoes"]),
    ("trainers", &["sneakers"]),
    ("mug", &["cup"]),
    ("cup", &["mug"]),
    ("necklace", &["pendant"]),
    ("pendant", &["necklace"]),
    ("perfume", &["fragrance"]),
    ("fragrance", &["perfume"]),
    ("sweater", &["jumper"]),
    ("jumper", &["sweater"]),
    ("couch", &["sofa"]),
    ("sofa", &["couch"]),
    ("laptop", &["notebook"]),
];

impl SynonymTable {
    pub fn empty() -> Self {
        Self {
            words: HashMap::new(),
            max_expansions: 3,
        }
    }

    /// The built-in gift-domain table.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (word, syns) in BUILTIN {
            table.insert(word, syns.iter().copied());
        }
        table
    }

    pub fn with_max_expansions(mut self, n: usize) -> Self {
        self.max_expansions = n;
        self
    }

    /// Add (or replace) the synonyms of a single word. Both sides are normalized.
    pub fn insert<'a>(&mut self, word: &str, synonyms: impl IntoIterator<Item = &'a str>) {
        let key = normalize(word);
        if key.is_empty() {
            return;
        }
        let values: Vec<String> = synonyms
            .into_iter()
            .map(normalize)
            .filter(|s| !s.is_empty() && *s != key)
            .collect();
        self.words.insert(key, values);
    }

    pub fn extend(&mut self, entries: &HashMap<String, Vec<String>>) {
        for (word, syns) in entries {
            self.insert(word, syns.iter().map(String::as_str));
        }
    }

    /// Expand a raw query into itself plus up to `max_expansions` single-word
    /// substitutions. The normalized query is always first; no duplicates.
    pub fn expand(&self, raw: &str) -> Vec<String> {
        let base = normalize(raw);
        let mut out = vec![base.clone()];
        if base.is_empty() {
            return out;
        }
        let tokens: Vec<&str> = base.split(' ').collect();
        'outer: for (idx, token) in tokens.iter().enumerate() {
            let Some(syns) = self.words.get(*token) else {
                continue;
            };
            for syn in syns {
                if out.len() > self.max_expansions {
                    break 'outer;
                }
                let mut replaced: Vec<&str> = tokens.clone();
                replaced[idx] = syn.as_str();
                let candidate = replaced.join(" ");
                if !out.contains(&candidate) {
                    out.push(candidate);
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::builtin()
    }
}
