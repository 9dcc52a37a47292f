//! Index Store - one repository contract over the persisted index layout
//!
//! Seven entity shapes, all scoped by `(index_handle, site_id)`:
//! postings, term statistics (the inverted mirror of postings), title markers,
//! n-gram mappings, n-gram counts, metadata counters and element summaries.
//!
//! The backing medium is chosen once at construction (`SqliteStore` or
//! `MemoryStore`); the indexer and the query path only ever see `dyn IndexStore`.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::warn;

pub const META_DOC_COUNT: &str = "doc_count";
pub const META_LENGTH_SUM: &str = "length_sum";
pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const SCHEMA_VERSION: &str = "1";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt index data: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identifies one document inside one site of one logical index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey {
    pub index: String,
    pub site_id: i64,
    pub element_id: i64,
}

impl DocKey {
    pub fn new(index: impl Into<String>, site_id: i64, element_id: i64) -> Self {
        Self {
            index: index.into(),
            site_id,
            element_id,
        }
    }
}

/// Document-side posting row: one distinct term of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub term: String,
    pub frequency: u32,
    pub language: String,
}

/// Term-side posting row, read from the term statistics table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermPosting {
    pub element_id: i64,
    pub frequency: u32,
    pub language: String,
}

/// Denormalized per-document row used for suggestions, filtering and phrase checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSummary {
    pub element_id: i64,
    pub title: String,
    pub element_type: Option<String>,
    /// Lowercase-normalized title, matched by prefix for suggestions
    pub search_text: String,
    /// Analyzed title terms, a field boundary marker, then body terms; space separated
    pub term_sequence: String,
    pub language: String,
    pub date_unix: Option<i64>,
}

/// Everything one indexing operation writes for one document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentRows {
    pub postings: Vec<Posting>,
    pub title_terms: BTreeSet<String>,
    /// term → its full n-gram set
    pub ngrams: BTreeMap<String, BTreeSet<String>>,
    pub summary: Option<ElementSummary>,
}

impl DocumentRows {
    /// Document length: total term occurrences after analysis.
    pub fn length(&self) -> u64 {
        self.postings.iter().map(|p| p.frequency as u64).sum()
    }

    pub fn terms(&self) -> HashSet<&str> {
        self.postings.iter().map(|p| p.term.as_str()).collect()
    }
}

/// Aggregate counters kept per `(index, site)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaCounters {
    pub doc_count: u64,
    pub length_sum: u64,
}

impl MetaCounters {
    pub fn avg_doc_len(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.length_sum as f64 / self.doc_count as f64
        }
    }

    /// Apply a signed delta. Results below zero are metadata drift: clamped and logged.
    pub(crate) fn apply_delta(self, docs: i64, length: i64, index: &str, site_id: i64) -> Self {
        Self {
            doc_count: clamp_counter(self.doc_count, docs, index, site_id, META_DOC_COUNT),
            length_sum: clamp_counter(self.length_sum, length, index, site_id, META_LENGTH_SUM),
        }
    }
}

fn clamp_counter(current: u64, delta: i64, index: &str, site_id: i64, key: &str) -> u64 {
    let next = current as i128 + delta as i128;
    if next < 0 {
        warn!(index, site_id, key, current, delta, "metadata drift: counter would go negative, clamping to zero");
        0
    } else {
        next.min(u64::MAX as i128) as u64
    }
}

/// Parse a stored counter value. Negative or unreadable values are drift.
pub(crate) fn parse_counter(raw: Option<&str>, index: &str, site_id: i64, key: &str) -> u64 {
    match raw.map(|r| r.trim().parse::<i64>()) {
        None => 0,
        Some(Ok(v)) if v >= 0 => v as u64,
        Some(_) => {
            warn!(index, site_id, key, raw = raw.unwrap_or_default(), "metadata drift: invalid counter, clamping to zero");
            0
        }
    }
}

/// Storage contract shared by every backing medium.
///
/// Every write method is atomic for the rows it touches: readers observe
/// either the complete previous state of a document or the complete new one.
pub trait IndexStore: Send + Sync {
    /// Register `(index, site)` so that the index is known even while empty.
    fn ensure_index(&self, index: &str, site_id: i64) -> StoreResult<()>;

    fn index_exists(&self, index: &str) -> StoreResult<bool>;

    /// Replace all rows of a document and apply the metadata delta.
    /// Returns the previous document length when the document existed.
    fn replace_document(&self, key: &DocKey, rows: &DocumentRows) -> StoreResult<Option<u64>>;

    /// Remove all rows of a document and apply the inverse delta.
    /// Returns `None` when there was nothing to remove.
    fn remove_document(&self, key: &DocKey) -> StoreResult<Option<u64>>;

    /// Remove every row of every site under `index`, keeping the index registered with zeroed counters.
    fn clear_index(&self, index: &str) -> StoreResult<()>;

    fn metadata(&self, index: &str, site_id: i64) -> StoreResult<MetaCounters>;

    /// All documents containing `term`, ordered by element id.
    fn term_postings(&self, index: &str, site_id: i64, term: &str) -> StoreResult<Vec<TermPosting>>;

    /// All terms of one document, ordered by term.
    fn document_postings(&self, key: &DocKey) -> StoreResult<Vec<Posting>>;

    fn document_lengths(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, u64>>;

    fn title_markers(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, HashSet<String>>>;

    /// Terms sharing at least one of `ngrams`, with the number of shared n-grams.
    fn terms_sharing_ngrams(&self, index: &str, site_id: i64, ngrams: &[String]) -> StoreResult<HashMap<String, usize>>;

    fn ngram_counts(&self, index: &str, site_id: i64, terms: &[String]) -> StoreResult<HashMap<String, usize>>;

    fn summaries(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, ElementSummary>>;

    /// Distinct document languages stored under `(index, site)`, as indexed.
    fn languages(&self, index: &str, site_id: i64) -> StoreResult<BTreeSet<String>>;

    /// Titles whose normalized form starts with `prefix` (first) or has a word starting with it.
    fn suggest_titles(&self, index: &str, site_id: i64, prefix: &str, limit: usize) -> StoreResult<Vec<String>>;

    /// Recompute document count and length sum of every site from the live postings.
    fn rebuild_metadata(&self, index: &str) -> StoreResult<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta_clamps_negative() {
        let c = MetaCounters { doc_count: 1, length_sum: 5 };
        let next = c.apply_delta(-3, -10, "idx", 1);
        assert_eq!(next, MetaCounters::default());
    }

    #[test]
    fn test_parse_counter_drift() {
        assert_eq!(parse_counter(Some("12"), "idx", 1, META_DOC_COUNT), 12);
        assert_eq!(parse_counter(Some("-4"), "idx", 1, META_DOC_COUNT), 0);
        assert_eq!(parse_counter(Some("garbage"), "idx", 1, META_DOC_COUNT), 0);
        assert_eq!(parse_counter(None, "idx", 1, META_DOC_COUNT), 0);
    }

    #[test]
    fn test_avg_doc_len_empty_index() {
        assert_eq!(MetaCounters::default().avg_doc_len(), 0.0);
        assert_eq!(MetaCounters { doc_count: 4, length_sum: 10 }.avg_doc_len(), 2.5);
    }
}
