//! Analyzer - text normalization, tokenization, stop words and n-grams
//!
//! The same analysis runs at index time and at query time so that case,
//! compatibility forms and stop words are handled identically on both sides.

use crate::config::AnalyzerConfig;
use crate::stopwords::StopWords;
use std::collections::BTreeSet;
use unicode_normalization::UnicodeNormalization;

/// Boundary marker padded around a term before n-gram windows are taken
pub const NGRAM_PAD: char = '_';

/// Separates title from body in a stored term sequence. Not alphanumeric, so
/// it can never be an analyzed term and no phrase spans it.
pub const FIELD_BOUNDARY: &str = "|";

/// NFKC then Unicode lowercase.
pub fn normalize(text: &str) -> String {
    text.nfkc().collect::<String>().to_lowercase()
}

/// Byte spans `(start, end)` of maximal alphanumeric runs in `text`.
/// Offsets index the text as given, so callers can slice the original.
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Normalized alphanumeric tokens, no length or stop-word filtering.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    word_spans(&normalized)
        .into_iter()
        .map(|(s, e)| normalized[s..e].to_string())
        .collect()
}

/// Union of all padded sliding windows of the given sizes.
pub fn ngram_set(term: &str, sizes: &[usize]) -> BTreeSet<String> {
    let padded: Vec<char> = std::iter::once(NGRAM_PAD)
        .chain(term.chars())
        .chain(std::iter::once(NGRAM_PAD))
        .collect();
    let mut grams = BTreeSet::new();
    for &n in sizes {
        if n == 0 || padded.len() < n {
            continue;
        }
        for window in padded.windows(n) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    min_word_length: usize,
    stop_words_enabled: bool,
    ngram_sizes: Vec<usize>,
    stop_words: StopWords,
}

impl Analyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self::with_stop_words(config, StopWords::builtin())
    }

    pub fn with_stop_words(config: &AnalyzerConfig, stop_words: StopWords) -> Self {
        Self {
            min_word_length: config.min_word_length,
            stop_words_enabled: config.stop_words_enabled,
            ngram_sizes: config.ngram_sizes.clone(),
            stop_words,
        }
    }

    pub fn stop_words_mut(&mut self) -> &mut StopWords {
        &mut self.stop_words
    }

    /// Ordered terms of `text` after normalization, length and stop-word filtering.
    pub fn analyze(&self, text: &str, language: &str) -> Vec<String> {
        self.analyze_for(text, &[language])
    }

    /// Like `analyze`, dropping a token that is a stop word in any of `languages`.
    /// Queries over documents of several languages analyze this way, so a word
    /// removed at index time under one of them never becomes a required term.
    pub fn analyze_for<S: AsRef<str>>(&self, text: &str, languages: &[S]) -> Vec<String> {
        tokenize(text)
            .into_iter()
            .filter(|t| self.keeps(t, languages))
            .collect()
    }

    /// Whether an already normalized token survives filtering.
    fn keeps<S: AsRef<str>>(&self, token: &str, languages: &[S]) -> bool {
        token.chars().count() >= self.min_word_length
            && !(self.stop_words_enabled && languages.iter().any(|l| self.stop_words.contains(l.as_ref(), token)))
    }

    pub fn ngrams(&self, term: &str) -> BTreeSet<String> {
        ngram_set(term, &self.ngram_sizes)
    }

    pub fn ngram_sizes(&self) -> &[usize] {
        &self.ngram_sizes
    }
}
