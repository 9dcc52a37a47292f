//! Highlighter - match marking and bounded snippets
//!
//! Works on the plain-text form of its input. Input that already carries this
//! highlighter's markup is reduced to plain text first (tags removed,
//! entities decoded), so highlighting twice never double-wraps.
//!
//! Matching is whole-word and case-insensitive: a word matches when its
//! normalized form equals a normalized term.

use crate::analyzer::{normalize, word_spans};
use crate::config::HighlightConfig;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashSet;

/// How far (in chars) a snippet edge may move to land on whitespace
const SNAP_WINDOW: usize = 10;
const ELLIPSIS: char = '…';

static ESCAPED: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(amp|lt|gt|quot|#39);").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightOptions {
    pub tag: String,
    pub class: Option<String>,
    pub snippet_length: usize,
    pub max_snippets: usize,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self::from(&HighlightConfig::default())
    }
}

impl From<&HighlightConfig> for HighlightOptions {
    fn from(config: &HighlightConfig) -> Self {
        Self {
            tag: config.tag.clone(),
            class: config.class.clone(),
            snippet_length: config.snippet_length,
            max_snippets: config.max_snippets,
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of `escape_html`, in a single pass so `&amp;lt;` decodes to `&lt;`.
pub fn unescape_html(text: &str) -> String {
    ESCAPED
        .replace_all(text, |caps: &Captures| match &caps[1] {
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            _ => "'",
        })
        .into_owned()
}

pub struct Highlighter {
    options: HighlightOptions,
    open_tag: String,
    close_tag: String,
    markup: Regex,
}

impl Highlighter {
    pub fn new(options: HighlightOptions) -> Self {
        let open_tag = match &options.class {
            Some(class) => format!("<{} class=\"{}\">", options.tag, escape_html(class)),
            None => format!("<{}>", options.tag),
        };
        let close_tag = format!("</{}>", options.tag);
        let pattern = format!(r"</?{}(?:\s[^>]*)?>", regex::escape(&options.tag));
        let markup = Regex::new(&pattern).expect("escaped tag name forms a valid regex");
        Self {
            options,
            open_tag,
            close_tag,
            markup,
        }
    }

    pub fn options(&self) -> &HighlightOptions {
        &self.options
    }

    /// Remove this highlighter's tags and decode the escaper's entities.
    pub fn strip(&self, html: &str) -> String {
        unescape_html(&self.markup.replace_all(html, ""))
    }

    fn to_plain<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.markup.is_match(text) {
            Cow::Owned(self.strip(text))
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Byte ranges of words in `plain` that match one of `terms`.
    fn match_ranges(plain: &str, terms: &[String]) -> Vec<(usize, usize)> {
        let wanted: HashSet<String> = terms.iter().map(|t| normalize(t)).filter(|t| !t.is_empty()).collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        word_spans(plain)
            .into_iter()
            .filter(|&(s, e)| wanted.contains(&normalize(&plain[s..e])))
            .collect()
    }

    /// Escape `plain[from..to]`, wrapping the ranges that lie fully inside it.
    fn render(&self, plain: &str, ranges: &[(usize, usize)], from: usize, to: usize) -> String {
        let mut out = String::with_capacity((to - from) + ranges.len() * (self.open_tag.len() + self.close_tag.len()));
        let mut cursor = from;
        for &(s, e) in ranges.iter().filter(|&&(s, e)| s >= from && e <= to) {
            out.push_str(&escape_html(&plain[cursor..s]));
            out.push_str(&self.open_tag);
            out.push_str(&escape_html(&plain[s..e]));
            out.push_str(&self.close_tag);
            cursor = e;
        }
        out.push_str(&escape_html(&plain[cursor..to]));
        out
    }

    pub fn highlight(&self, text: &str, terms: &[String]) -> String {
        let plain = self.to_plain(text);
        let ranges = Self::match_ranges(&plain, terms);
        self.render(&plain, &ranges, 0, plain.len())
    }

    pub fn snippets(&self, text: &str, terms: &[String]) -> Vec<String> {
        let plain = self.to_plain(text);
        let ranges = Self::match_ranges(&plain, terms);
        if ranges.is_empty() || self.options.max_snippets == 0 {
            return Vec::new();
        }

        // Work in chars for window arithmetic, bytes for slicing
        let mut char_starts: Vec<usize> = plain.char_indices().map(|(i, _)| i).collect();
        let total_chars = char_starts.len();
        char_starts.push(plain.len());
        let to_char = |byte: usize| char_starts.partition_point(|&b| b < byte);
        let chars: Vec<char> = plain.chars().collect();

        let mut windows: Vec<(usize, usize)> = Vec::new();
        for &(s, e) in &ranges {
            let (ms, me) = (to_char(s), to_char(e));
            let len = self.options.snippet_length.max(me - ms);
            let before = (len - (me - ms)) / 2;
            let mut start = ms.saturating_sub(before);
            let end = (start + len).min(total_chars);
            start = start.min(end.saturating_sub(len));

            match windows.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => {
                    if windows.len() == self.options.max_snippets {
                        break;
                    }
                    windows.push((start, end));
                }
            }
        }

        windows
            .into_iter()
            .map(|(start, end)| {
                let start = snap_start(&chars, start);
                let end = snap_end(&chars, end);
                let body = self.render(&plain, &ranges, char_starts[start], char_starts[end]);
                let mut snippet = String::new();
                if start > 0 {
                    snippet.push(ELLIPSIS);
                }
                snippet.push_str(&collapse_whitespace(&body));
                if end < total_chars {
                    snippet.push(ELLIPSIS);
                }
                snippet
            })
            .collect()
    }
}

/// Move a window start back to just after nearby whitespace, so it begins on a word.
fn snap_start(chars: &[char], start: usize) -> usize {
    if start == 0 || chars[start - 1].is_whitespace() {
        return start;
    }
    let floor = start.saturating_sub(SNAP_WINDOW);
    (floor..start).rev().find(|&i| chars[i].is_whitespace()).map(|i| i + 1).unwrap_or(start)
}

/// Move a window end forward to nearby whitespace, so it ends on a word.
fn snap_end(chars: &[char], end: usize) -> usize {
    if end >= chars.len() || chars[end].is_whitespace() {
        return end;
    }
    let ceil = (end + SNAP_WINDOW).min(chars.len());
    (end..ceil).find(|&i| chars[i].is_whitespace()).unwrap_or(end)
}

/// Newlines and tabs become spaces; runs of whitespace collapse to one.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(c);
            last_was_space = false;
        }
    }
    out.trim().to_string()
}

pub fn highlight(text: &str, terms: &[String], options: &HighlightOptions) -> String {
    Highlighter::new(options.clone()).highlight(text, terms)
}

pub fn snippets(text: &str, terms: &[String], options: &HighlightOptions) -> Vec<String> {
    Highlighter::new(options.clone()).snippets(text, terms)
}
