//! Indexer - document records to postings, title markers, n-grams and summaries
//!
//! Every write for one document goes through a single atomic store call.
//! Writers for the same `(index, site, element)` are serialized by a striped
//! lock; different documents proceed in parallel.

use crate::analyzer::{normalize, Analyzer, FIELD_BOUNDARY};
use crate::interface::{DocStats, Document, EngineError};
use crate::store::{DocKey, DocumentRows, ElementSummary, IndexStore, Posting};
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

const LOCK_STRIPES: usize = 64;

/// Fixed pool of mutexes; a document key always maps to the same one.
pub(crate) struct DocumentLocks {
    stripes: Vec<Mutex<()>>,
}

impl DocumentLocks {
    pub(crate) fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, key: &DocKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    pub(crate) fn lock(&self, key: &DocKey) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(key)].lock()
    }

    /// Every stripe, taken in order. Excludes all single-document writers.
    pub(crate) fn lock_all(&self) -> Vec<MutexGuard<'_, ()>> {
        self.stripes.iter().map(|m| m.lock()).collect()
    }
}

pub(crate) fn validate_handle(index: &str) -> Result<(), EngineError> {
    if index.trim().is_empty() {
        return Err(EngineError::InvalidInput("index handle must not be empty".to_string()));
    }
    Ok(())
}

pub struct Indexer {
    store: Arc<dyn IndexStore>,
    analyzer: Arc<Analyzer>,
    locks: DocumentLocks,
}

impl Indexer {
    pub fn new(store: Arc<dyn IndexStore>, analyzer: Arc<Analyzer>) -> Self {
        Self {
            store,
            analyzer,
            locks: DocumentLocks::new(),
        }
    }

    /// Everything the store persists for `doc`. Pure; touches no storage.
    pub fn build_rows(&self, doc: &Document) -> DocumentRows {
        let title_terms = self.analyzer.analyze(&doc.title, &doc.language);
        let body_terms = self.analyzer.analyze(&doc.body, &doc.language);

        let mut frequencies: BTreeMap<&str, u32> = BTreeMap::new();
        for term in title_terms.iter().chain(body_terms.iter()) {
            *frequencies.entry(term.as_str()).or_default() += 1;
        }

        let postings = frequencies
            .iter()
            .map(|(term, &frequency)| Posting {
                term: term.to_string(),
                frequency,
                language: doc.language.clone(),
            })
            .collect();
        let ngrams = frequencies
            .keys()
            .map(|term| (term.to_string(), self.analyzer.ngrams(term)))
            .collect();

        let mut sequence: Vec<&str> = title_terms.iter().map(String::as_str).collect();
        if !title_terms.is_empty() && !body_terms.is_empty() {
            sequence.push(FIELD_BOUNDARY);
        }
        sequence.extend(body_terms.iter().map(String::as_str));
        let term_sequence = sequence.join(" ");

        DocumentRows {
            postings,
            title_terms: title_terms.iter().cloned().collect::<BTreeSet<_>>(),
            ngrams,
            summary: Some(ElementSummary {
                element_id: doc.element_id,
                title: doc.title.clone(),
                element_type: doc.element_type.clone(),
                search_text: normalize(&doc.title).split_whitespace().collect::<Vec<_>>().join(" "),
                term_sequence,
                language: doc.language.clone(),
                date_unix: doc.date.map(|d| d.timestamp()),
            }),
        }
    }

    /// Analyze and store one document, replacing any previous version.
    pub fn index_document(&self, index: &str, doc: &Document) -> Result<DocStats, EngineError> {
        validate_handle(index)?;
        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        let rows = self.build_rows(doc);
        let key = DocKey::new(index, doc.site_id, doc.element_id);

        let previous_length = {
            let _guard = self.locks.lock(&key);
            self.store.ensure_index(index, doc.site_id)?;
            self.store.replace_document(&key, &rows)?
        };

        let stats = DocStats {
            element_id: doc.element_id,
            distinct_terms: rows.postings.len(),
            doc_length: rows.length(),
            title_terms: rows.title_terms.len(),
            is_new: previous_length.is_none(),
            previous_length,
        };

        #[cfg(feature = "perf-log")]
        eprintln!("[perf] index_document id={} terms={} took={:.1}ms", doc.element_id, stats.distinct_terms, t0.elapsed().as_secs_f64() * 1000.0);

        debug!(
            index,
            site_id = doc.site_id,
            element_id = doc.element_id,
            distinct_terms = stats.distinct_terms,
            doc_length = stats.doc_length,
            is_new = stats.is_new,
            "document indexed"
        );
        Ok(stats)
    }

    /// Index a batch. Different documents run in parallel; outcomes keep input order.
    pub fn index_documents(&self, index: &str, docs: &[Document]) -> Vec<Result<DocStats, EngineError>> {
        use rayon::prelude::*;
        docs.par_iter().map(|doc| self.index_document(index, doc)).collect()
    }

    /// Remove one document. Returns whether anything was removed.
    pub fn remove_document(&self, index: &str, site_id: i64, element_id: i64) -> Result<bool, EngineError> {
        validate_handle(index)?;
        let key = DocKey::new(index, site_id, element_id);
        let removed = {
            let _guard = self.locks.lock(&key);
            self.store.remove_document(&key)?
        };
        debug!(index, site_id, element_id, removed = removed.is_some(), "document removed");
        Ok(removed.is_some())
    }

    pub fn clear_index(&self, index: &str) -> Result<(), EngineError> {
        validate_handle(index)?;
        let _guards = self.locks.lock_all();
        self.store.clear_index(index)?;
        info!(index, "index cleared by request");
        Ok(())
    }

    /// Stats of a stored document, reconstructed from its rows.
    pub fn document_stats(&self, index: &str, site_id: i64, element_id: i64) -> Result<Option<DocStats>, EngineError> {
        let key = DocKey::new(index, site_id, element_id);
        let postings = self.store.document_postings(&key)?;
        let summary = self.store.summaries(index, site_id, &[element_id])?;
        if postings.is_empty() && summary.is_empty() {
            return Ok(None);
        }
        let title_terms = self
            .store
            .title_markers(index, site_id, &[element_id])?
            .get(&element_id)
            .map_or(0, |t| t.len());
        let doc_length = postings.iter().map(|p| p.frequency as u64).sum();
        Ok(Some(DocStats {
            element_id,
            distinct_terms: postings.len(),
            doc_length,
            title_terms,
            is_new: false,
            previous_length: None,
        }))
    }
}
