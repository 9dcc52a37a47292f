//! In-memory index store
//!
//! Same contract as the SQLite store, kept in ordered maps behind one
//! read/write lock. Writes take the write lock for the whole document so
//! readers never see half of a replacement.

use super::{
    DocKey, DocumentRows, ElementSummary, IndexStore, MetaCounters, Posting, StoreResult, TermPosting,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

type SiteKey = (String, i64);
/// (index, site, term) or (index, site, ngram)
type SiteTermKey = (String, i64, String);

#[derive(Default)]
struct Tables {
    postings: BTreeMap<DocKey, BTreeMap<String, Posting>>,
    term_stats: BTreeMap<SiteTermKey, BTreeMap<i64, TermPosting>>,
    title_terms: BTreeMap<DocKey, BTreeSet<String>>,
    ngrams: BTreeMap<SiteTermKey, BTreeSet<String>>,
    ngrams_by_term: BTreeMap<SiteTermKey, BTreeSet<String>>,
    ngram_counts: BTreeMap<SiteTermKey, usize>,
    metadata: BTreeMap<SiteKey, MetaCounters>,
    summaries: BTreeMap<DocKey, ElementSummary>,
}

fn site_term(index: &str, site_id: i64, term: &str) -> SiteTermKey {
    (index.to_string(), site_id, term.to_string())
}

impl Tables {
    /// Returns (existed, previous length, previous terms)
    fn delete_document(&mut self, key: &DocKey) -> (bool, u64, Vec<String>) {
        let existed = self.summaries.remove(key).is_some();
        self.title_terms.remove(key);
        let previous = self.postings.remove(key).unwrap_or_default();
        let previous_length: u64 = previous.values().map(|p| p.frequency as u64).sum();

        for term in previous.keys() {
            let stats_key = site_term(&key.index, key.site_id, term);
            if let Some(docs) = self.term_stats.get_mut(&stats_key) {
                docs.remove(&key.element_id);
                if docs.is_empty() {
                    self.term_stats.remove(&stats_key);
                }
            }
        }

        (existed || previous_length > 0, previous_length, previous.into_keys().collect())
    }

    fn remove_orphaned_ngrams(&mut self, index: &str, site_id: i64, terms: &[String]) {
        for term in terms {
            let key = site_term(index, site_id, term);
            if self.term_stats.contains_key(&key) {
                continue;
            }
            self.ngram_counts.remove(&key);
            for gram in self.ngrams_by_term.remove(&key).unwrap_or_default() {
                let gram_key = site_term(index, site_id, &gram);
                if let Some(owners) = self.ngrams.get_mut(&gram_key) {
                    owners.remove(term);
                    if owners.is_empty() {
                        self.ngrams.remove(&gram_key);
                    }
                }
            }
        }
    }

    fn insert_document(&mut self, key: &DocKey, rows: &DocumentRows) {
        let mut postings = BTreeMap::new();
        for p in &rows.postings {
            self.term_stats
                .entry(site_term(&key.index, key.site_id, &p.term))
                .or_default()
                .insert(
                    key.element_id,
                    TermPosting {
                        element_id: key.element_id,
                        frequency: p.frequency,
                        language: p.language.clone(),
                    },
                );
            postings.insert(p.term.clone(), p.clone());
        }
        if !postings.is_empty() {
            self.postings.insert(key.clone(), postings);
        }
        if !rows.title_terms.is_empty() {
            self.title_terms.insert(key.clone(), rows.title_terms.clone());
        }

        for (term, grams) in &rows.ngrams {
            let term_key = site_term(&key.index, key.site_id, term);
            for gram in grams {
                self.ngrams
                    .entry(site_term(&key.index, key.site_id, gram))
                    .or_default()
                    .insert(term.clone());
            }
            self.ngrams_by_term.entry(term_key.clone()).or_default().extend(grams.iter().cloned());
            self.ngram_counts.insert(term_key, grams.len());
        }

        if let Some(summary) = &rows.summary {
            self.summaries.insert(key.clone(), summary.clone());
        }
    }

    fn apply_delta(&mut self, key: &DocKey, docs: i64, length: i64) {
        let counters = self.metadata.entry((key.index.clone(), key.site_id)).or_default();
        *counters = counters.apply_delta(docs, length, &key.index, key.site_id);
    }
}

/// Volatile store for tests, tooling and small embedded indexes
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryStore {
    fn ensure_index(&self, index: &str, site_id: i64) -> StoreResult<()> {
        self.tables.write().metadata.entry((index.to_string(), site_id)).or_default();
        Ok(())
    }

    fn index_exists(&self, index: &str) -> StoreResult<bool> {
        Ok(self.tables.read().metadata.keys().any(|(i, _)| i == index))
    }

    fn replace_document(&self, key: &DocKey, rows: &DocumentRows) -> StoreResult<Option<u64>> {
        let mut tables = self.tables.write();
        let (existed, previous_length, previous_terms) = tables.delete_document(key);
        tables.insert_document(key, rows);

        let current = rows.terms();
        let orphans: Vec<String> = previous_terms.into_iter().filter(|t| !current.contains(t.as_str())).collect();
        tables.remove_orphaned_ngrams(&key.index, key.site_id, &orphans);

        let docs_delta = if existed { 0 } else { 1 };
        tables.apply_delta(key, docs_delta, rows.length() as i64 - previous_length as i64);
        debug!(index = %key.index, site_id = key.site_id, element_id = key.element_id, terms = rows.postings.len(), "document replaced");
        Ok(existed.then_some(previous_length))
    }

    fn remove_document(&self, key: &DocKey) -> StoreResult<Option<u64>> {
        let mut tables = self.tables.write();
        let (existed, previous_length, previous_terms) = tables.delete_document(key);
        if !existed {
            return Ok(None);
        }
        tables.remove_orphaned_ngrams(&key.index, key.site_id, &previous_terms);
        tables.apply_delta(key, -1, -(previous_length as i64));
        Ok(Some(previous_length))
    }

    fn clear_index(&self, index: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        tables.postings.retain(|k, _| k.index != index);
        tables.title_terms.retain(|k, _| k.index != index);
        tables.summaries.retain(|k, _| k.index != index);
        tables.term_stats.retain(|(i, _, _), _| i != index);
        tables.ngrams.retain(|(i, _, _), _| i != index);
        tables.ngrams_by_term.retain(|(i, _, _), _| i != index);
        tables.ngram_counts.retain(|(i, _, _), _| i != index);
        for ((i, _), counters) in tables.metadata.iter_mut() {
            if i == index {
                *counters = MetaCounters::default();
            }
        }
        info!(index, "index cleared");
        Ok(())
    }

    fn metadata(&self, index: &str, site_id: i64) -> StoreResult<MetaCounters> {
        Ok(self
            .tables
            .read()
            .metadata
            .get(&(index.to_string(), site_id))
            .copied()
            .unwrap_or_default())
    }

    fn term_postings(&self, index: &str, site_id: i64, term: &str) -> StoreResult<Vec<TermPosting>> {
        Ok(self
            .tables
            .read()
            .term_stats
            .get(&site_term(index, site_id, term))
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    fn document_postings(&self, key: &DocKey) -> StoreResult<Vec<Posting>> {
        Ok(self
            .tables
            .read()
            .postings
            .get(key)
            .map(|terms| terms.values().cloned().collect())
            .unwrap_or_default())
    }

    fn document_lengths(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, u64>> {
        let tables = self.tables.read();
        let mut lengths = HashMap::with_capacity(element_ids.len());
        for &id in element_ids {
            if let Some(terms) = tables.postings.get(&DocKey::new(index, site_id, id)) {
                lengths.insert(id, terms.values().map(|p| p.frequency as u64).sum());
            }
        }
        Ok(lengths)
    }

    fn title_markers(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, HashSet<String>>> {
        let tables = self.tables.read();
        let mut markers = HashMap::new();
        for &id in element_ids {
            if let Some(terms) = tables.title_terms.get(&DocKey::new(index, site_id, id)) {
                markers.insert(id, terms.iter().cloned().collect());
            }
        }
        Ok(markers)
    }

    fn terms_sharing_ngrams(&self, index: &str, site_id: i64, ngrams: &[String]) -> StoreResult<HashMap<String, usize>> {
        let tables = self.tables.read();
        let mut shared: HashMap<String, usize> = HashMap::new();
        let unique: BTreeSet<&String> = ngrams.iter().collect();
        for gram in unique {
            if let Some(owners) = tables.ngrams.get(&site_term(index, site_id, gram)) {
                for term in owners {
                    *shared.entry(term.clone()).or_default() += 1;
                }
            }
        }
        Ok(shared)
    }

    fn ngram_counts(&self, index: &str, site_id: i64, terms: &[String]) -> StoreResult<HashMap<String, usize>> {
        let tables = self.tables.read();
        Ok(terms
            .iter()
            .filter_map(|t| tables.ngram_counts.get(&site_term(index, site_id, t)).map(|&c| (t.clone(), c)))
            .collect())
    }

    fn summaries(&self, index: &str, site_id: i64, element_ids: &[i64]) -> StoreResult<HashMap<i64, ElementSummary>> {
        let tables = self.tables.read();
        Ok(element_ids
            .iter()
            .filter_map(|&id| tables.summaries.get(&DocKey::new(index, site_id, id)).map(|s| (id, s.clone())))
            .collect())
    }

    fn languages(&self, index: &str, site_id: i64) -> StoreResult<BTreeSet<String>> {
        let tables = self.tables.read();
        Ok(tables
            .summaries
            .iter()
            .filter(|(k, _)| k.index == index && k.site_id == site_id)
            .map(|(_, s)| s.language.clone())
            .collect())
    }

    fn suggest_titles(&self, index: &str, site_id: i64, prefix: &str, limit: usize) -> StoreResult<Vec<String>> {
        if prefix.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let prefix = prefix.to_lowercase();
        let word_prefix = format!(" {}", prefix);
        let tables = self.tables.read();

        let mut leading = BTreeSet::new();
        let mut inner = BTreeSet::new();
        for (key, summary) in &tables.summaries {
            if key.index != index || key.site_id != site_id {
                continue;
            }
            let text = summary.search_text.to_lowercase();
            if text.starts_with(&prefix) {
                leading.insert(summary.title.clone());
            } else if text.contains(&word_prefix) {
                inner.insert(summary.title.clone());
            }
        }

        let mut seen = HashSet::new();
        Ok(leading
            .into_iter()
            .chain(inner)
            .filter(|t| seen.insert(t.clone()))
            .take(limit)
            .collect())
    }

    fn rebuild_metadata(&self, index: &str) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let sites: Vec<i64> = tables.metadata.keys().filter(|(i, _)| i == index).map(|(_, s)| *s).collect();
        for site_id in sites {
            let doc_count = tables.summaries.keys().filter(|k| k.index == index && k.site_id == site_id).count() as u64;
            let length_sum: u64 = tables
                .postings
                .iter()
                .filter(|(k, _)| k.index == index && k.site_id == site_id)
                .flat_map(|(_, terms)| terms.values())
                .map(|p| p.frequency as u64)
                .sum();
            let counters = MetaCounters { doc_count, length_sum };
            tables.metadata.insert((index.to_string(), site_id), counters);
            info!(index, site_id, doc_count, length_sum, "metadata rebuilt");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract_tests;

    #[test]
    fn test_replace_then_remove() {
        contract_tests::replace_then_remove(&MemoryStore::new());
    }

    #[test]
    fn test_shared_terms_keep_ngrams() {
        contract_tests::shared_terms_keep_ngrams(&MemoryStore::new());
    }

    #[test]
    fn test_clear_and_rebuild() {
        contract_tests::clear_and_rebuild(&MemoryStore::new());
    }

    #[test]
    fn test_languages_per_site() {
        contract_tests::languages_per_site(&MemoryStore::new());
    }

    #[test]
    fn test_suggestions() {
        contract_tests::suggestions_prefer_title_prefix(&MemoryStore::new());
    }

    #[test]
    fn test_sites_are_isolated() {
        let store = MemoryStore::new();
        let rows = contract_tests::rows(&[("boot", 1)], &["boot"]);
        store.replace_document(&DocKey::new("idx", 1, 1), &rows).unwrap();
        assert!(store.term_postings("idx", 2, "boot").unwrap().is_empty());
        assert_eq!(store.term_postings("idx", 1, "boot").unwrap().len(), 1);
    }
}
