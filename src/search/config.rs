use crate::query::{normalize, SynonymTable};

/// Orchestrator policy knobs.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Normalized terms the local catalog is trusted to answer on its own.
    pub high_confidence_terms: Vec<String>,
    pub synonyms: SynonymTable,
    /// The upstream is asked for at least this many results so the cached
    /// entry can serve larger requests later.
    pub min_fetch_results: usize,
    /// Local results needed to skip the upstream, capped by the caller's `max_results`.
    pub mock_accept_floor: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            high_confidence_terms: vec!["headphones".to_string(), "audio".to_string()],
            synonyms: SynonymTable::builtin(),
            min_fetch_results: 20,
            mock_accept_floor: 5,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_high_confidence_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.high_confidence_terms = terms
            .into_iter()
            .map(|t| normalize(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_min_fetch_results(mut self, n: usize) -> Self {
        self.min_fetch_results = n;
        self
    }

    pub fn with_mock_accept_floor(mut self, n: usize) -> Self {
        self.mock_accept_floor = n;
        self
    }
}
