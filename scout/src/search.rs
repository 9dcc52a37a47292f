//! Query execution (postings retrieval, fuzzy fallback, BM25 + boosts)
//!
//! Required terms are conjunctive. Each one resolves to a group of variants:
//! the term itself when it has postings, otherwise its fuzzy expansions.
//! Phrases are constraints over the stored term sequence. A document's score
//! is the sum of its best variant per group plus its boosted phrase scores.

use crate::analyzer::Analyzer;
use crate::candidate::SearchCandidate;
use crate::config::EngineConfig;
use crate::fuzzy::{Deadline, Expansion, FuzzyMatcher};
use crate::interface::{EngineError, SearchHit, SearchOptions, SearchResult, SearchWarning};
use crate::query::{ParsedQuery, Phrase};
use crate::ranking::{rank, Bm25, Boosts};
use crate::stopwords::primary_subtag;
use crate::store::{IndexStore, TermPosting};
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One way a required term can be satisfied
struct Variant {
    exact: bool,
    similarity: f64,
    /// element id → (frequency, language)
    postings: HashMap<i64, (u32, String)>,
}

impl Variant {
    fn new(exact: bool, similarity: f64, postings: Vec<TermPosting>) -> Self {
        Self {
            exact,
            similarity,
            postings: postings.into_iter().map(|p| (p.element_id, (p.frequency, p.language))).collect(),
        }
    }

    fn df(&self) -> u64 {
        self.postings.len() as u64
    }
}

struct TermGroup {
    variants: Vec<(String, Variant)>,
}

impl TermGroup {
    fn documents(&self) -> BTreeSet<i64> {
        self.variants.iter().flat_map(|(_, v)| v.postings.keys().copied()).collect()
    }
}

struct PhraseGroup<'q> {
    phrase: &'q Phrase,
    postings: Vec<(String, Variant)>,
}

/// Everything needed to score one `(index, site)`.
pub(crate) struct QueryExecutor<'a> {
    store: &'a dyn IndexStore,
    analyzer: &'a Analyzer,
    config: &'a EngineConfig,
    token: CancellationToken,
}

impl<'a> QueryExecutor<'a> {
    pub(crate) fn new(store: &'a dyn IndexStore, analyzer: &'a Analyzer, config: &'a EngineConfig, token: CancellationToken) -> Self {
        Self {
            store,
            analyzer,
            config,
            token,
        }
    }

    fn check_cancelled(&self) -> Result<(), EngineError> {
        if self.token.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Run a parsed query. Warnings already on `query` are carried into the result.
    pub(crate) fn execute(&self, index: &str, query: &ParsedQuery, options: &SearchOptions) -> Result<SearchResult, EngineError> {
        let mut warnings = query.warnings.clone();
        let site = options.site_id;
        if query.is_empty() {
            return Ok(SearchResult { warnings, ..SearchResult::default() });
        }

        #[cfg(feature = "perf-log")]
        let t0 = std::time::Instant::now();

        let meta = self.store.metadata(index, site)?;
        let n = meta.doc_count;
        let avg = meta.avg_doc_len();

        let fuzzy_enabled = options.fuzzy.unwrap_or(self.config.fuzzy.enabled);
        let deadline = Deadline::after(options.fuzzy_timeout.unwrap_or_else(|| self.config.fuzzy.timeout())).with_token(self.token.clone());
        let matcher = FuzzyMatcher::new(self.store, self.analyzer, self.config.fuzzy.similarity_threshold, self.config.fuzzy.max_candidates);

        let mut groups: Vec<TermGroup> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        for term in &query.required {
            self.check_cancelled()?;
            let exact = self.store.term_postings(index, site, term)?;
            if !exact.is_empty() {
                groups.push(TermGroup { variants: vec![(term.clone(), Variant::new(true, 1.0, exact))] });
                continue;
            }
            if !fuzzy_enabled {
                debug!(index, site, term = term.as_str(), "required term has no postings");
                return Ok(SearchResult { warnings, ..SearchResult::default() });
            }
            match matcher.expand(index, site, term, &deadline)? {
                Expansion::TimedOut => {
                    self.check_cancelled()?;
                    skipped.push(term.clone());
                }
                Expansion::Matches(candidates) => {
                    let mut variants = Vec::with_capacity(candidates.len());
                    for c in candidates {
                        let postings = self.store.term_postings(index, site, &c.term)?;
                        if !postings.is_empty() {
                            variants.push((c.term, Variant::new(false, c.similarity, postings)));
                        }
                    }
                    if variants.is_empty() {
                        debug!(index, site, term = term.as_str(), "no exact or fuzzy match");
                        return Ok(SearchResult { warnings, ..SearchResult::default() });
                    }
                    debug!(index, site, term = term.as_str(), expansions = variants.len(), "fuzzy expansion");
                    groups.push(TermGroup { variants });
                }
            }
        }
        if !skipped.is_empty() {
            warn!(index, site, terms = ?skipped, "fuzzy expansion timed out, continuing with exact matches only");
            warnings.push(SearchWarning::FuzzyTimeout { skipped_terms: skipped });
        }

        let mut phrases: Vec<PhraseGroup> = Vec::with_capacity(query.phrases.len());
        for phrase in &query.phrases {
            self.check_cancelled()?;
            let mut postings = Vec::with_capacity(phrase.terms.len());
            for term in &phrase.terms {
                let exact = self.store.term_postings(index, site, term)?;
                if exact.is_empty() {
                    return Ok(SearchResult { warnings, ..SearchResult::default() });
                }
                postings.push((term.clone(), Variant::new(true, 1.0, exact)));
            }
            phrases.push(PhraseGroup { phrase, postings });
        }

        let Some(mut matched) = self.intersect(&groups, &phrases) else {
            return Ok(SearchResult { warnings, ..SearchResult::default() });
        };
        self.apply_exclusions(index, site, query, &mut matched)?;
        self.check_cancelled()?;

        let ids: Vec<i64> = matched.iter().copied().collect();
        let summaries = self.store.summaries(index, site, &ids)?;
        let lengths = self.store.document_lengths(index, site, &ids)?;
        let titles = self.store.title_markers(index, site, &ids)?;
        let no_title = HashSet::new();

        let language_filter = [options.filters.language.as_deref(), query.language.as_deref()];
        let type_filter = [options.filters.element_type.as_deref(), query.element_type.as_deref()];

        let mut candidates: Vec<SearchCandidate> = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(summary) = summaries.get(&id) else { continue };
            let language = self.hit_language(id, &groups, &phrases).unwrap_or_else(|| summary.language.clone());
            if language_filter.iter().flatten().any(|want| primary_subtag(want) != primary_subtag(&language)) {
                continue;
            }
            let element_type = summary.element_type.as_deref().map(str::to_lowercase);
            if type_filter.iter().flatten().any(|want| element_type.as_deref() != Some(want.to_lowercase().as_str())) {
                continue;
            }
            let in_title = titles.get(&id).unwrap_or(&no_title);
            if !query.title_terms.iter().all(|t| in_title.contains(t)) {
                continue;
            }
            let candidate = SearchCandidate::new(id, language, summary.term_sequence.clone(), summary.date_unix);
            if !phrases.iter().all(|p| candidate.contains_phrase(&p.phrase.terms)) {
                continue;
            }
            candidates.push(candidate);
        }
        self.check_cancelled()?;

        let bm25 = Bm25::from_config(&self.config.scoring);
        let boosts = Boosts::from_config(&self.config.scoring);
        {
            use rayon::prelude::*;
            candidates.par_iter_mut().for_each(|c| {
                let doc_len = lengths.get(&c.element_id).copied().unwrap_or(0);
                let in_title = titles.get(&c.element_id).unwrap_or(&no_title);
                let contribution = |term: &str, variant: &Variant| -> Option<f64> {
                    let (tf, _) = variant.postings.get(&c.element_id)?;
                    let base = bm25.term_score(Bm25::idf(n, variant.df()), *tf, doc_len, avg);
                    Some(base * boosts.term_weight(in_title.contains(term), variant.exact, variant.similarity))
                };

                let mut score = 0.0;
                for group in &groups {
                    score += group
                        .variants
                        .iter()
                        .filter_map(|(term, v)| contribution(term, v))
                        .fold(0.0, f64::max);
                }
                for phrase in &phrases {
                    let combined: f64 = phrase.postings.iter().filter_map(|(term, v)| contribution(term, v)).sum();
                    score += combined * boosts.phrase;
                }
                c.score = score;
            });
        }

        rank(&mut candidates, options.sort);
        let total_count = candidates.len() as u64;
        let limit = options.limit.unwrap_or(self.config.search.default_limit).min(self.config.search.max_limit);
        let hits: Vec<SearchHit> = candidates
            .into_iter()
            .skip(options.offset)
            .take(limit)
            .map(|c| SearchHit {
                matched_terms: self.matched_terms(c.element_id, &groups, &phrases),
                element_id: c.element_id,
                score: c.score,
                language: c.language,
            })
            .collect();

        #[cfg(feature = "perf-log")]
        eprintln!(
            "[perf] execute groups={} phrases={} total={} took={:.1}ms",
            groups.len(),
            phrases.len(),
            total_count,
            t0.elapsed().as_secs_f64() * 1000.0,
        );

        debug!(index, site, total_count, returned = hits.len(), "query executed");
        Ok(SearchResult {
            hits,
            total_count,
            took_ms: 0,
            warnings,
        })
    }

    /// Documents satisfying every group and containing every phrase term.
    /// `None` when nothing positive is left to match.
    fn intersect(&self, groups: &[TermGroup], phrases: &[PhraseGroup]) -> Option<BTreeSet<i64>> {
        let mut sets = groups
            .iter()
            .map(TermGroup::documents)
            .chain(phrases.iter().flat_map(|p| p.postings.iter().map(|(_, v)| v.postings.keys().copied().collect::<BTreeSet<i64>>())));
        let first = sets.next()?;
        Some(sets.fold(first, |acc, set| acc.intersection(&set).copied().collect()))
    }

    fn apply_exclusions(&self, index: &str, site: i64, query: &ParsedQuery, matched: &mut BTreeSet<i64>) -> Result<(), EngineError> {
        for term in &query.excluded {
            for p in self.store.term_postings(index, site, term)? {
                matched.remove(&p.element_id);
            }
        }
        for phrase in &query.excluded_phrases {
            if phrase.terms.is_empty() || matched.is_empty() {
                continue;
            }
            let mut containing: Option<BTreeSet<i64>> = None;
            for term in &phrase.terms {
                let docs: BTreeSet<i64> = self.store.term_postings(index, site, term)?.into_iter().map(|p| p.element_id).collect();
                containing = Some(match containing {
                    Some(acc) => acc.intersection(&docs).copied().collect(),
                    None => docs.intersection(matched).copied().collect(),
                });
            }
            let containing: Vec<i64> = containing.unwrap_or_default().into_iter().collect();
            if containing.is_empty() {
                continue;
            }
            for (id, summary) in self.store.summaries(index, site, &containing)? {
                let candidate = SearchCandidate::new(id, summary.language, summary.term_sequence, None);
                if candidate.contains_phrase(&phrase.terms) {
                    matched.remove(&id);
                }
            }
        }
        Ok(())
    }

    /// Stored form of every variant and phrase term with a posting in this document.
    fn matched_terms(&self, id: i64, groups: &[TermGroup], phrases: &[PhraseGroup]) -> Vec<String> {
        let mut terms: Vec<String> = Vec::new();
        let matching = groups
            .iter()
            .flat_map(|g| g.variants.iter())
            .chain(phrases.iter().flat_map(|p| p.postings.iter()))
            .filter(|(_, v)| v.postings.contains_key(&id));
        for (term, _) in matching {
            if !terms.contains(term) {
                terms.push(term.clone());
            }
        }
        terms
    }

    /// Language of the first posting that matched this document.
    fn hit_language(&self, id: i64, groups: &[TermGroup], phrases: &[PhraseGroup]) -> Option<String> {
        groups
            .iter()
            .flat_map(|g| g.variants.iter())
            .chain(phrases.iter().flat_map(|p| p.postings.iter()))
            .find_map(|(_, v)| v.postings.get(&id).map(|(_, lang)| lang.clone()))
    }
}
