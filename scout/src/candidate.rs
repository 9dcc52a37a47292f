//! Search candidate with memoized derived state.
//!
//! Module isolation ensures no code outside this module can mutate
//! `term_sequence` after construction, so the `OnceLock` cache can never go stale.

use std::sync::OnceLock;

/// A document that survived retrieval and filtering, accumulating its score.
/// `terms()` splits the stored term sequence on first access and caches it for
/// every phrase check that follows.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub element_id: i64,
    /// Language of the first matching posting
    pub language: String,
    pub date_unix: Option<i64>,
    pub score: f64,
    term_sequence: String,
    terms: OnceLock<Vec<String>>,
}

impl SearchCandidate {
    pub fn new(element_id: i64, language: String, term_sequence: String, date_unix: Option<i64>) -> Self {
        Self {
            element_id,
            language,
            date_unix,
            score: 0.0,
            term_sequence,
            terms: OnceLock::new(),
        }
    }

    pub fn terms(&self) -> &[String] {
        self.terms
            .get_or_init(|| self.term_sequence.split_whitespace().map(str::to_string).collect())
    }

    /// Whether `phrase` occurs as adjacent terms, in order.
    pub fn contains_phrase(&self, phrase: &[String]) -> bool {
        if phrase.is_empty() {
            return true;
        }
        self.terms().windows(phrase.len()).any(|w| w == phrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_contains_phrase() {
        let c = SearchCandidate::new(1, "en".into(), "red shoes comfortable red running shoes".into(), None);
        assert!(c.contains_phrase(&terms(&["running", "shoes"])));
        assert!(c.contains_phrase(&terms(&["red", "shoes"])));
        assert!(!c.contains_phrase(&terms(&["shoes", "running"])));
        assert!(!c.contains_phrase(&terms(&["red", "comfortable"])));
        assert!(c.contains_phrase(&[]));
    }

    #[test]
    fn test_phrase_does_not_span_field_boundary() {
        let c = SearchCandidate::new(1, "en".into(), "red shoes | comfortable red running shoes".into(), None);
        assert!(!c.contains_phrase(&terms(&["shoes", "comfortable"])));
        assert!(c.contains_phrase(&terms(&["red", "shoes"])));
        assert!(c.contains_phrase(&terms(&["comfortable", "red"])));
    }

    #[test]
    fn test_phrase_longer_than_document() {
        let c = SearchCandidate::new(1, "en".into(), "shoes".into(), None);
        assert!(!c.contains_phrase(&terms(&["red", "shoes"])));
        assert_eq!(c.terms().len(), 1);
    }
}
