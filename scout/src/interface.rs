//! Scout public interface
//!
//! Records, options, results and errors shared by the engine, the CLI and
//! embedding applications, plus the async service trait.

use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Result ordering. Relevance keeps discovery order among equal scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Relevance,
    DateDesc,
    DateAsc,
}

/// Non-fatal problems encountered while answering a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchWarning {
    /// Part of the query could not be interpreted and was treated as plain text
    InvalidQuery { fragment: String, reason: String },
    /// Fuzzy expansion ran out of time; these terms were matched exactly only
    FuzzyTimeout { skipped_terms: Vec<String> },
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// Flat document record supplied by the content system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub element_id: i64,
    #[serde(default = "default_site_id")]
    pub site_id: i64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub element_type: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

fn default_site_id() -> i64 {
    1
}

fn default_language() -> String {
    "en".to_string()
}

impl Document {
    pub fn new(element_id: i64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            element_id,
            site_id: default_site_id(),
            language: default_language(),
            title: title.into(),
            body: body.into(),
            element_type: None,
            date: None,
        }
    }

    pub fn with_site(mut self, site_id: i64) -> Self {
        self.site_id = site_id;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_element_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = Some(element_type.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}

/// Outcome of indexing one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocStats {
    pub element_id: i64,
    pub distinct_terms: usize,
    /// Total term occurrences after analysis (title + body)
    pub doc_length: u64,
    pub title_terms: usize,
    pub is_new: bool,
    pub previous_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Match the hit language by primary subtag
    pub language: Option<String>,
    pub element_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub site_id: i64,
    /// Falls back to the configured default, capped at the configured maximum
    pub limit: Option<usize>,
    pub offset: usize,
    pub filters: SearchFilters,
    pub sort: SortOrder,
    /// Override the configured fuzzy switch for this query
    pub fuzzy: Option<bool>,
    /// Override the configured fuzzy expansion budget for this query
    pub fuzzy_timeout: Option<Duration>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            limit: None,
            offset: 0,
            filters: SearchFilters::default(),
            sort: SortOrder::default(),
            fuzzy: None,
            fuzzy_timeout: None,
        }
    }
}

impl SearchOptions {
    pub fn for_site(site_id: i64) -> Self {
        Self {
            site_id,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestOptions {
    pub site_id: i64,
    pub limit: usize,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        Self {
            site_id: default_site_id(),
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub element_id: i64,
    pub score: f64,
    pub language: String,
    /// Stored terms this document matched, fuzzy variants included, in query
    /// order. Pass these to the highlighter to mark what actually matched.
    #[serde(default)]
    pub matched_terms: Vec<String>,
}

/// Search result container
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    /// Matching documents before offset and limit
    pub total_count: u64,
    pub took_ms: u64,
    pub warnings: Vec<SearchWarning>,
}

/// Error type for Scout operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Index not found: {0}")]
    IndexNotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Storage failures are transient; callers may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Storage(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Storage(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Async surface of the search engine, implemented by `SearchEngine`.
#[async_trait::async_trait]
pub trait SearchEngineApi: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Ranked search. Dropping the future cancels the running query.
    async fn search(&self, index: String, query: String, options: SearchOptions) -> Result<SearchResult, EngineError>;

    /// Title suggestions for an autocomplete prefix
    async fn suggest(&self, prefix: String, index: String, options: SuggestOptions) -> Result<Vec<String>, EngineError>;

    /// Wrap matches of `terms` in the configured highlight tag
    fn highlight(&self, text: &str, terms: &[String]) -> String;

    /// Highlighted windows around matches of `terms`
    fn snippets(&self, text: &str, terms: &[String]) -> Vec<String>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Index or re-index one document
    async fn index_document(&self, index: String, document: Document) -> Result<DocStats, EngineError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Delete Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Remove one document. Removing a missing document is a no-op.
    async fn remove_document(&self, index: String, site_id: i64, element_id: i64) -> Result<(), EngineError>;

    /// Remove every document of every site of an index
    async fn clear_index(&self, index: String) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_json_defaults() {
        let doc: Document = serde_json::from_str(r#"{"element_id": 3, "title": "Red Shoes"}"#).unwrap();
        assert_eq!(doc.site_id, 1);
        assert_eq!(doc.language, "en");
        assert!(doc.body.is_empty());
        assert_eq!(doc, Document::new(3, "Red Shoes", ""));
    }

    #[test]
    fn test_storage_errors_are_retryable() {
        let err: EngineError = StoreError::Corrupt("bad row".into()).into();
        assert!(err.is_retryable());
        assert!(!EngineError::IndexNotFound("products".into()).is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_warning_serialization_is_tagged() {
        let w = SearchWarning::FuzzyTimeout { skipped_terms: vec!["shoe".into()] };
        let json = serde_json::to_string(&w).unwrap();
        assert!(json.contains(r#""kind":"fuzzy_timeout""#));
    }
}
