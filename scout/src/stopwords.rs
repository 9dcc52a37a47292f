//! Per-language stop-word lists
//!
//! Lists are plain data keyed by the primary language subtag. The engine
//! never depends on their contents; callers may replace or extend them.

use std::collections::{HashMap, HashSet};

const EN: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be", "because", "been",
    "before", "being", "but", "by", "can", "could", "did", "do", "does", "doing", "for", "from", "had", "has",
    "have", "having", "he", "her", "here", "hers", "him", "his", "how", "i", "if", "in", "into", "is", "it",
    "its", "just", "me", "my", "no", "nor", "not", "of", "off", "on", "once", "only", "or", "other", "our",
    "ours", "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the", "their",
    "theirs", "them", "then", "there", "these", "they", "this", "those", "through", "to", "too", "under",
    "until", "up", "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "would", "you", "your", "yours",
];

const DE: &[&str] = &[
    "aber", "alle", "als", "also", "am", "an", "auch", "auf", "aus", "bei", "bin", "bis", "bist", "da", "damit",
    "dann", "das", "dass", "dein", "dem", "den", "der", "des", "dich", "die", "dir", "doch", "du", "durch", "ein",
    "eine", "einem", "einen", "einer", "eines", "er", "es", "euch", "euer", "für", "hat", "hatte", "ich", "ihr",
    "ihre", "im", "in", "ist", "ja", "jede", "kann", "kein", "man", "mein", "mich", "mir", "mit", "nach",
    "nicht", "noch", "nur", "ob", "oder", "ohne", "sich", "sie", "sind", "so", "über", "um", "und", "uns",
    "unser", "unter", "vom", "von", "vor", "war", "waren", "was", "weil", "wenn", "wer", "wie", "wir", "wird",
    "zu", "zum", "zur",
];

const FR: &[&str] = &[
    "à", "au", "aux", "avec", "ce", "ces", "cette", "dans", "de", "des", "du", "elle", "elles", "en", "est",
    "et", "être", "eu", "il", "ils", "je", "la", "le", "les", "leur", "lui", "ma", "mais", "me", "même", "mes",
    "moi", "mon", "ne", "nos", "notre", "nous", "on", "ou", "où", "par", "pas", "pour", "qu", "que", "qui",
    "sa", "se", "ses", "son", "sont", "sur", "ta", "te", "tes", "toi", "ton", "tu", "un", "une", "vos", "votre",
    "vous",
];

const ES: &[&str] = &[
    "a", "al", "algo", "como", "con", "de", "del", "el", "ella", "ellas", "ellos", "en", "era", "es", "esa",
    "ese", "eso", "esta", "este", "esto", "fue", "ha", "hay", "la", "las", "le", "les", "lo", "los", "más",
    "me", "mi", "mis", "muy", "ni", "nos", "o", "para", "pero", "por", "que", "se", "sin", "sobre", "son", "su",
    "sus", "también", "te", "tu", "un", "una", "uno", "unos", "y", "ya", "yo",
];

const NL: &[&str] = &[
    "aan", "al", "als", "bij", "dat", "de", "den", "der", "die", "dit", "door", "een", "en", "er", "had", "heb",
    "hebben", "heeft", "het", "hij", "hoe", "hun", "ik", "in", "is", "je", "kan", "maar", "me", "met", "mij",
    "na", "naar", "niet", "nog", "nu", "of", "om", "omdat", "ons", "ook", "op", "over", "te", "tot", "u", "uit",
    "van", "voor", "was", "wat", "we", "wel", "werd", "wij", "zal", "ze", "zich", "zij", "zijn", "zo",
];

const IT: &[&str] = &[
    "a", "ad", "al", "alla", "alle", "anche", "che", "chi", "ci", "come", "con", "da", "dal", "dalla", "dei",
    "del", "della", "delle", "di", "e", "è", "gli", "ha", "hanno", "i", "il", "in", "io", "la", "le", "lei",
    "lo", "loro", "lui", "ma", "mi", "ne", "nel", "nella", "noi", "non", "o", "per", "più", "quella", "quello",
    "questa", "questo", "se", "si", "sono", "su", "sua", "suo", "ti", "tra", "tu", "un", "una", "uno", "voi",
];

/// Primary language subtag, lowercased: `en-GB` → `en`, `pt_BR` → `pt`.
pub fn primary_subtag(language: &str) -> String {
    language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

#[derive(Debug, Clone)]
pub struct StopWords {
    lists: HashMap<String, HashSet<String>>,
}

impl Default for StopWords {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StopWords {
    /// No lists at all; every term passes.
    pub fn empty() -> Self {
        Self { lists: HashMap::new() }
    }

    /// Built-in lists for en, de, fr, es, nl and it.
    pub fn builtin() -> Self {
        let mut words = Self::empty();
        for (lang, list) in [("en", EN), ("de", DE), ("fr", FR), ("es", ES), ("nl", NL), ("it", IT)] {
            words.insert(lang, list.iter().copied());
        }
        words
    }

    /// Add words to a language's list, creating it when missing.
    pub fn insert<I, S>(&mut self, language: &str, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = self.lists.entry(primary_subtag(language)).or_default();
        list.extend(words.into_iter().map(|w| w.as_ref().to_lowercase()));
    }

    pub fn contains(&self, language: &str, term: &str) -> bool {
        self.lists
            .get(&primary_subtag(language))
            .is_some_and(|list| list.contains(term))
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(String::as_str)
    }
}
