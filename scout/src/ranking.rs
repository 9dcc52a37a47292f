//! BM25 scoring with multiplicative boosts, and final result ordering.
//!
//! score_term = IDF * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * docLen / avgDocLen))
//! IDF        = ln((N - df + 0.5) / (df + 0.5) + 1)
//!
//! Boosts multiply the base term score: title marker, exact (non-fuzzy)
//! match, and adjacent phrase (applied to the phrase's combined score).

use crate::candidate::SearchCandidate;
use crate::config::ScoringConfig;
use crate::interface::SortOrder;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25 {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25 {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            k1: config.k1,
            b: config.b,
        }
    }

    /// Inverse document frequency. `df` above `n` (stale counters) is treated as `df == n`.
    pub fn idf(n: u64, df: u64) -> f64 {
        let n = n.max(df) as f64;
        let df = df as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Saturated term-frequency score. An unknown average length falls back to the document's own.
    pub fn term_score(&self, idf: f64, tf: u32, doc_len: u64, avg_doc_len: f64) -> f64 {
        let tf = tf as f64;
        let doc_len = doc_len as f64;
        let avg = if avg_doc_len > 0.0 { avg_doc_len } else { doc_len.max(1.0) };
        let norm = if doc_len > 0.0 { doc_len / avg } else { 1.0 };
        idf * (tf * (self.k1 + 1.0)) / (tf + self.k1 * (1.0 - self.b + self.b * norm))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boosts {
    pub title: f64,
    pub exact: f64,
    pub phrase: f64,
}

impl Boosts {
    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            title: config.title_boost,
            exact: config.exact_match_boost,
            phrase: config.phrase_boost,
        }
    }

    /// Multiplier for one term contribution. Fuzzy matches are weighted by
    /// their similarity instead of the exact boost.
    pub fn term_weight(&self, in_title: bool, exact: bool, similarity: f64) -> f64 {
        let title = if in_title { self.title } else { 1.0 };
        let exactness = if exact { self.exact } else { similarity };
        title * exactness
    }
}

fn by_score(a: &SearchCandidate, b: &SearchCandidate) -> Ordering {
    b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
}

/// Order candidates for output. Stable, so equal keys keep discovery order.
/// Date orders put undated documents last and break date ties by score.
pub fn rank(candidates: &mut [SearchCandidate], sort: SortOrder) {
    match sort {
        SortOrder::Relevance => candidates.sort_by(by_score),
        SortOrder::DateDesc | SortOrder::DateAsc => candidates.sort_by(|a, b| {
            let dates = match (a.date_unix, b.date_unix) {
                (Some(x), Some(y)) if sort == SortOrder::DateDesc => y.cmp(&x),
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            dates.then_with(|| by_score(a, b))
        }),
    }
}
