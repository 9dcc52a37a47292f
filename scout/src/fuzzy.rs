//! Fuzzy Matcher - n-gram Jaccard expansion for terms without exact postings
//!
//! Candidate terms come from the n-gram mapping table; similarity uses the
//! stored n-gram counts so candidate n-gram sets are never rebuilt at query
//! time. Expansion is bounded by a deadline and a cancellation token.

use crate::analyzer::Analyzer;
use crate::store::{IndexStore, StoreResult};
use std::cmp::Ordering;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Rounding slack, in ULPs of the compared value, for `threshold * union`
const THRESHOLD_ULPS: f64 = 4.0;

/// Point in time after which expansion gives up, plus an optional cancel signal.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Option<Instant>,
    token: Option<CancellationToken>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
            token: None,
        }
    }

    pub fn unbounded() -> Self {
        Self { at: None, token: None }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at) || self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// |A ∩ B| / |A ∪ B| from the intersection size and both set sizes.
pub fn jaccard(shared: usize, query_count: usize, candidate_count: usize) -> f64 {
    let union = (query_count + candidate_count).saturating_sub(shared);
    if union == 0 {
        return 0.0;
    }
    shared as f64 / union as f64
}

/// `shared / union >= threshold`, compared on the integer side so a ratio
/// exactly at the threshold passes and anything measurably below it fails.
pub fn meets_threshold(shared: usize, query_count: usize, candidate_count: usize, threshold: f64) -> bool {
    let union = (query_count + candidate_count).saturating_sub(shared);
    if union == 0 {
        return false;
    }
    let needed = threshold * union as f64;
    shared as f64 >= needed - needed.abs() * THRESHOLD_ULPS * f64::EPSILON
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyCandidate {
    pub term: String,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    /// Similar stored terms, best first (possibly none)
    Matches(Vec<FuzzyCandidate>),
    /// The deadline passed before expansion finished
    TimedOut,
}

pub struct FuzzyMatcher<'a> {
    store: &'a dyn IndexStore,
    analyzer: &'a Analyzer,
    threshold: f64,
    max_candidates: usize,
}

impl<'a> FuzzyMatcher<'a> {
    pub fn new(store: &'a dyn IndexStore, analyzer: &'a Analyzer, threshold: f64, max_candidates: usize) -> Self {
        Self {
            store,
            analyzer,
            threshold,
            max_candidates,
        }
    }

    pub fn expand(&self, index: &str, site_id: i64, term: &str, deadline: &Deadline) -> StoreResult<Expansion> {
        if deadline.expired() {
            return Ok(Expansion::TimedOut);
        }
        let grams: Vec<String> = self.analyzer.ngrams(term).into_iter().collect();
        if grams.is_empty() {
            return Ok(Expansion::Matches(Vec::new()));
        }

        let shared = self.store.terms_sharing_ngrams(index, site_id, &grams)?;
        if deadline.expired() {
            return Ok(Expansion::TimedOut);
        }
        let terms: Vec<String> = shared.keys().filter(|t| t.as_str() != term).cloned().collect();
        let counts = self.store.ngram_counts(index, site_id, &terms)?;
        if deadline.expired() {
            return Ok(Expansion::TimedOut);
        }

        let mut candidates: Vec<FuzzyCandidate> = terms
            .into_iter()
            .filter_map(|candidate| {
                let shared_count = shared.get(&candidate).copied()?;
                let candidate_count = counts.get(&candidate).copied()?;
                meets_threshold(shared_count, grams.len(), candidate_count, self.threshold).then(|| FuzzyCandidate {
                    similarity: jaccard(shared_count, grams.len(), candidate_count),
                    term: candidate,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.term.cmp(&b.term))
        });
        candidates.truncate(self.max_candidates);
        Ok(Expansion::Matches(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ngram_set;
    use crate::config::AnalyzerConfig;
    use crate::store::{DocKey, DocumentRows, MemoryStore, Posting};

    fn store_with_terms(terms: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for (i, term) in terms.iter().enumerate() {
            let rows = DocumentRows {
                postings: vec![Posting {
                    term: term.to_string(),
                    frequency: 1,
                    language: "en".into(),
                }],
                ngrams: [(term.to_string(), ngram_set(term, &[2, 3]))].into_iter().collect(),
                ..DocumentRows::default()
            };
            store.replace_document(&DocKey::new("idx", 1, i as i64 + 1), &rows).unwrap();
        }
        store
    }

    fn matches(expansion: Expansion) -> Vec<FuzzyCandidate> {
        match expansion {
            Expansion::Matches(m) => m,
            Expansion::TimedOut => panic!("unexpected timeout"),
        }
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(7, 9, 11), 7.0 / 13.0);
        assert_eq!(jaccard(0, 0, 0), 0.0);
        assert_eq!(jaccard(4, 4, 4), 1.0);
    }

    #[test]
    fn test_singular_finds_plural() {
        let store = store_with_terms(&["shoes", "boots", "red"]);
        let analyzer = Analyzer::new(&AnalyzerConfig::default());
        let matcher = FuzzyMatcher::new(&store, &analyzer, 0.5, 100);
        let found = matches(matcher.expand("idx", 1, "shoe", &Deadline::unbounded()).unwrap());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].term, "shoes");
        assert!((found[0].similarity - 7.0 / 13.0).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let store = store_with_terms(&["shoes"]);
        let analyzer = Analyzer::new(&AnalyzerConfig::default());
        let exact = jaccard(7, 9, 11);

        let at = FuzzyMatcher::new(&store, &analyzer, exact, 100);
        assert_eq!(matches(at.expand("idx", 1, "shoe", &Deadline::unbounded()).unwrap()).len(), 1);

        let above = FuzzyMatcher::new(&store, &analyzer, exact + 1e-6, 100);
        assert!(matches(above.expand("idx", 1, "shoe", &Deadline::unbounded()).unwrap()).is_empty());

        let barely_above = FuzzyMatcher::new(&store, &analyzer, 7.0 / 13.0 + 1e-10, 100);
        assert!(matches(barely_above.expand("idx", 1, "shoe", &Deadline::unbounded()).unwrap()).is_empty());
    }

    #[test]
    fn test_meets_threshold() {
        assert!(meets_threshold(7, 9, 11, 7.0 / 13.0));
        assert!(!meets_threshold(7, 9, 11, 7.0 / 13.0 + 1e-10));
        assert!(meets_threshold(1, 1, 1, 1.0));
        assert!(meets_threshold(1, 2, 1, 0.5));
        assert!(!meets_threshold(0, 0, 0, 0.0));
        for union in 1..200usize {
            for shared in 0..=union {
                // query and candidate sizes summing to union + shared
                let threshold = shared as f64 / union as f64;
                assert!(meets_threshold(shared, shared, union, threshold), "{shared}/{union}");
            }
        }
    }

    #[test]
    fn test_ordering_and_cap() {
        let store = store_with_terms(&["shoes", "shoed", "shore"]);
        let analyzer = Analyzer::new(&AnalyzerConfig::default());
        let matcher = FuzzyMatcher::new(&store, &analyzer, 0.1, 2);
        let found = matches(matcher.expand("idx", 1, "shoex", &Deadline::unbounded()).unwrap());
        assert_eq!(found.len(), 2);
        assert!(found[0].similarity >= found[1].similarity);
        // "shoed" and "shoes" tie; ties break on the term
        assert_eq!(found[0].term, "shoed");
        assert_eq!(found[1].term, "shoes");
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let store = store_with_terms(&["shoes"]);
        let analyzer = Analyzer::new(&AnalyzerConfig::default());
        let matcher = FuzzyMatcher::new(&store, &analyzer, 0.5, 100);
        let deadline = Deadline::after(Duration::ZERO);
        assert_eq!(matcher.expand("idx", 1, "shoe", &deadline).unwrap(), Expansion::TimedOut);
    }

    #[test]
    fn test_cancelled_token_times_out() {
        let store = store_with_terms(&["shoes"]);
        let analyzer = Analyzer::new(&AnalyzerConfig::default());
        let matcher = FuzzyMatcher::new(&store, &analyzer, 0.5, 100);
        let token = CancellationToken::new();
        token.cancel();
        let deadline = Deadline::unbounded().with_token(token);
        assert_eq!(matcher.expand("idx", 1, "shoe", &deadline).unwrap(), Expansion::TimedOut);
    }
}
