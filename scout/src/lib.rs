//! Scout - self-hosted lexical search engine
//!
//! Documents are analyzed into an inverted index kept in SQLite or in memory,
//! queried with BM25 ranking plus title, exact-match and phrase boosts, with
//! n-gram Jaccard fuzzy fallback for terms that have no exact postings, and
//! highlighted for display.

pub mod analyzer;
mod cache;
pub(crate) mod candidate;
pub mod config;
mod engine;
pub mod fields;
pub mod fuzzy;
pub mod highlight;
mod indexer;
pub mod interface;
pub mod query;
pub mod ranking;
mod search;
pub mod stopwords;
pub mod store;

pub use config::EngineConfig;
pub use engine::SearchEngine;
pub use fields::FieldContent;
pub use highlight::{HighlightOptions, Highlighter};
pub use indexer::Indexer;
pub use interface::*;
pub use store::{IndexStore, MemoryStore, MetaCounters, SqliteStore};
