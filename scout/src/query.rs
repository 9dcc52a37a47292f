//! Query Parser - raw query string to structured query
//!
//! Grammar, loosely:
//!   query   := unit*
//!   unit    := ["-" | NEGATION] (phrase | field | word)
//!   phrase  := '"' text '"'
//!   field   := name ":" (word | phrase)
//!
//! Parsing never fails. Anything that cannot be interpreted is treated as
//! plain text and reported as an `InvalidQuery` warning. A quote without a
//! partner is an ordinary character.

use crate::analyzer::Analyzer;
use crate::interface::SearchWarning;
use crate::stopwords::primary_subtag;

/// A quoted phrase, analyzed into its term sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub raw: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedQuery {
    /// Terms every hit must contain, in query order, deduplicated
    pub required: Vec<String>,
    pub excluded: Vec<String>,
    pub phrases: Vec<Phrase>,
    pub excluded_phrases: Vec<Phrase>,
    /// Required terms that must also occur in the title
    pub title_terms: Vec<String>,
    pub language: Option<String>,
    pub element_type: Option<String>,
    pub warnings: Vec<SearchWarning>,
}

impl ParsedQuery {
    /// Nothing positive to match: no required terms and no phrases.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.phrases.is_empty()
    }

    /// Canonical form used for cache keys
    pub fn normalized(&self) -> String {
        let phrase = |p: &Phrase| format!("\"{}\"", p.terms.join(" "));
        let mut parts: Vec<String> = Vec::new();
        parts.extend(self.required.iter().cloned());
        parts.extend(self.phrases.iter().map(phrase));
        parts.extend(self.excluded.iter().map(|t| format!("-{}", t)));
        parts.extend(self.excluded_phrases.iter().map(|p| format!("-{}", phrase(p))));
        parts.extend(self.title_terms.iter().map(|t| format!("title:{}", t)));
        if let Some(lang) = &self.language {
            parts.push(format!("lang:{}", lang));
        }
        if let Some(ty) = &self.element_type {
            parts.push(format!("type:{}", ty));
        }
        parts.join(" ")
    }
}

/// Negation keyword for a language, matched case-sensitively in upper case.
pub fn negation_keyword(language: &str) -> &'static str {
    match primary_subtag(language).as_str() {
        "de" => "NICHT",
        "fr" => "SAUF",
        "es" => "NO",
        "nl" => "NIET",
        "it" => "NON",
        _ => "NOT",
    }
}

#[derive(Debug, PartialEq)]
enum Unit {
    Word(String),
    Quoted(String),
    Field { name: String, value: String, quoted: bool },
}

#[derive(Debug, PartialEq)]
struct Token {
    unit: Unit,
    negated: bool,
    raw: String,
}

fn find_quote(chars: &[char], from: usize) -> Option<usize> {
    chars.get(from..)?.iter().position(|&c| c == '"').map(|p| from + p)
}

/// Split the raw query into units. Quotes pair only when a partner exists.
fn scan(input: &str) -> Vec<Token> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let mut negated = false;
        if chars[i] == '-' && chars.get(i + 1).is_some_and(|c| !c.is_whitespace()) {
            negated = true;
            i += 1;
        }

        let unit = match (chars[i], find_quote(&chars, i + 1)) {
            ('"', Some(end)) => {
                let text = chars[i + 1..end].iter().collect();
                i = end + 1;
                Unit::Quoted(text)
            }
            _ => {
                let (unit, end) = scan_word(&chars, i);
                i = end;
                unit
            }
        };
        tokens.push(Token {
            unit,
            negated,
            raw: chars[start..i].iter().collect(),
        });
    }
    tokens
}

/// A word runs to the next whitespace, except `name:"..."` which runs to the closing quote.
fn scan_word(chars: &[char], from: usize) -> (Unit, usize) {
    let is_field_name = |name: &[char]| !name.is_empty() && name.iter().all(|c| c.is_alphabetic());
    let mut i = from;
    while i < chars.len() && !chars[i].is_whitespace() {
        if chars[i] == ':' && chars.get(i + 1) == Some(&'"') && is_field_name(&chars[from..i]) {
            if let Some(end) = find_quote(chars, i + 2) {
                let unit = Unit::Field {
                    name: chars[from..i].iter().collect(),
                    value: chars[i + 2..end].iter().collect(),
                    quoted: true,
                };
                return (unit, end + 1);
            }
        }
        i += 1;
    }

    let word: String = chars[from..i].iter().collect();
    let unit = match word.split_once(':') {
        Some((name, value)) if !name.is_empty() && name.chars().all(char::is_alphabetic) => Unit::Field {
            name: name.to_string(),
            value: value.to_string(),
            quoted: false,
        },
        _ => Unit::Word(word),
    };
    (unit, i)
}

pub struct QueryParser<'a> {
    analyzer: &'a Analyzer,
}

impl<'a> QueryParser<'a> {
    pub fn new(analyzer: &'a Analyzer) -> Self {
        Self { analyzer }
    }

    /// Parse `input`, treating a word as a stop word when any of `languages`
    /// lists it. A `lang:` filter in the query narrows `languages` to itself.
    pub fn parse(&self, input: &str, languages: &[String]) -> ParsedQuery {
        let mut query = ParsedQuery::default();
        let tokens = scan(input);
        let filtered = tokens.iter().find_map(|t| match &t.unit {
            Unit::Field { name, value, .. }
                if !t.negated && !value.trim().is_empty() && matches!(name.to_lowercase().as_str(), "lang" | "language") =>
            {
                Some(vec![primary_subtag(value.trim())])
            }
            _ => None,
        });
        let languages = filtered.as_deref().unwrap_or(languages);
        let is_negation = |w: &str| w == "NOT" || languages.iter().any(|l| negation_keyword(l) == w);
        let mut pending_negation: Option<String> = None;

        for token in tokens {
            if !token.negated && matches!(&token.unit, Unit::Word(w) if is_negation(w)) {
                if let Some(previous) = pending_negation.replace(token.raw.clone()) {
                    self.add_text(&mut query, &previous, false, languages);
                }
                continue;
            }
            let negated = token.negated || pending_negation.take().is_some();

            match token.unit {
                Unit::Word(word) => self.add_text(&mut query, &word, negated, languages),
                Unit::Quoted(text) => self.add_phrase(&mut query, &text, negated, languages),
                Unit::Field { name, value, quoted } => {
                    self.add_field(&mut query, &token.raw, &name, &value, quoted, negated, languages)
                }
            }
        }

        if let Some(dangling) = pending_negation {
            query.warnings.push(SearchWarning::InvalidQuery {
                fragment: dangling.clone(),
                reason: "negation without an operand".to_string(),
            });
            self.add_text(&mut query, &dangling, false, languages);
        }

        query.required.retain(|t| !query.excluded.contains(t));
        query
    }

    fn add_text(&self, query: &mut ParsedQuery, text: &str, negated: bool, languages: &[String]) {
        let target = if negated { &mut query.excluded } else { &mut query.required };
        for term in self.analyzer.analyze_for(text, languages) {
            if !target.contains(&term) {
                target.push(term);
            }
        }
    }

    fn add_phrase(&self, query: &mut ParsedQuery, text: &str, negated: bool, languages: &[String]) {
        let terms = self.analyzer.analyze_for(text, languages);
        if terms.len() < 2 {
            // A one-word phrase is just a term
            return self.add_text(query, text, negated, languages);
        }
        let phrase = Phrase {
            raw: text.to_string(),
            terms,
        };
        let target = if negated { &mut query.excluded_phrases } else { &mut query.phrases };
        if !target.contains(&phrase) {
            target.push(phrase);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_field(
        &self,
        query: &mut ParsedQuery,
        raw: &str,
        name: &str,
        value: &str,
        quoted: bool,
        negated: bool,
        languages: &[String],
    ) {
        let value = value.trim();
        let invalid = |query: &mut ParsedQuery, reason: String| {
            query.warnings.push(SearchWarning::InvalidQuery {
                fragment: raw.to_string(),
                reason,
            });
        };

        if value.is_empty() {
            invalid(query, format!("empty value for field `{}`", name));
            return self.add_text(query, name, negated, languages);
        }

        match name.to_lowercase().as_str() {
            "title" => {
                if negated {
                    return self.add_text(query, value, true, languages);
                }
                for term in self.analyzer.analyze_for(value, languages) {
                    if !query.title_terms.contains(&term) {
                        query.title_terms.push(term.clone());
                    }
                    if !query.required.contains(&term) {
                        query.required.push(term);
                    }
                }
            }
            field @ ("lang" | "language" | "type") => {
                if negated {
                    invalid(query, format!("negated `{}` filter is not supported", field));
                    return;
                }
                let value = value.to_lowercase();
                if field == "type" {
                    query.element_type = Some(value);
                } else {
                    query.language = Some(primary_subtag(&value));
                }
            }
            _ => {
                invalid(query, format!("unknown field `{}`", name));
                let text = if quoted { format!("{} {}", name, value) } else { format!("{}:{}", name, value) };
                self.add_text(query, &text, negated, languages);
            }
        }
    }
}
