//! Content fields - turning heterogeneous field values into indexable text
//!
//! The content system hands over a closed set of field kinds. Each kind has
//! its own extraction; a field with nothing to index yields `None` and is
//! skipped by the aggregation loop.

use crate::interface::Document;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static SCRIPT_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(?:script|style)\b[^>]*>.*?</(?:script|style)\s*>").expect("valid regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]{1,6}|#[0-9]{1,7}|[a-zA-Z]{2,8});").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// One field of a content element, tagged by kind.
pub enum FieldContent<'a> {
    PlainText(String),
    /// HTML or other tag markup
    RichText(String),
    Keywords(Vec<String>),
    /// Titles of related elements, supplied lazily by the content system
    Relations(Box<dyn Iterator<Item = String> + Send + 'a>),
    /// Rows of cell values
    Table(Vec<Vec<String>>),
}

impl<'a> FieldContent<'a> {
    pub fn relations<I>(titles: I) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'a,
    {
        FieldContent::Relations(Box::new(titles.into_iter()))
    }

    /// Indexable text of this field, `None` when there is nothing to index.
    pub fn extract(self) -> Option<String> {
        let text = match self {
            FieldContent::PlainText(text) => collapse_whitespace(&text),
            FieldContent::RichText(html) => strip_markup(&html),
            FieldContent::Keywords(words) => join_non_empty(words.iter().map(String::as_str)),
            FieldContent::Relations(titles) => {
                let titles: Vec<String> = titles.collect();
                join_non_empty(titles.iter().map(String::as_str))
            }
            FieldContent::Table(rows) => join_non_empty(rows.iter().flatten().map(String::as_str)),
        };
        (!text.is_empty()).then_some(text)
    }
}

fn join_non_empty<'s>(parts: impl Iterator<Item = &'s str>) -> String {
    parts
        .map(collapse_whitespace)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Remove tags (and script/style bodies), decode entities, collapse whitespace.
pub fn strip_markup(html: &str) -> String {
    let without_code = SCRIPT_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    collapse_whitespace(&decode_entities(&without_tags))
}

/// Decode named and numeric character references. Unknown names are kept verbatim.
pub fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &Captures| {
            let body = &caps[1];
            let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                named_entity(body)
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "laquo" => '«',
        "raquo" => '»',
        "copy" => '©',
        "reg" => '®',
        "euro" => '€',
        _ => return None,
    })
}

impl Document {
    /// Build a document whose body is the text of every field that has any.
    pub fn from_fields<'a, I>(element_id: i64, title: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = FieldContent<'a>>,
    {
        let body = fields
            .into_iter()
            .filter_map(FieldContent::extract)
            .collect::<Vec<_>>()
            .join("\n");
        Document::new(element_id, title, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        let html = "<p>Comfortable <b>red</b>&nbsp;running&amp;walking</p><script>var x = 1;</script>";
        // the decoded no-break space collapses with the surrounding whitespace
        assert_eq!(strip_markup(html), "Comfortable red running&walking");
    }

    #[test]
    fn test_decode_numeric_and_unknown_entities() {
        assert_eq!(decode_entities("&#72;&#x69; &bogus; &#xZZ;"), "Hi &bogus; &#xZZ;");
    }

    #[test]
    fn test_empty_fields_are_skipped() {
        assert_eq!(FieldContent::PlainText("   ".into()).extract(), None);
        assert_eq!(FieldContent::RichText("<br/>".into()).extract(), None);
        assert_eq!(FieldContent::Keywords(vec![]).extract(), None);
        assert_eq!(FieldContent::Table(vec![vec![String::new()]]).extract(), None);
    }

    #[test]
    fn test_from_fields_aggregates_in_order() {
        let related = vec!["Sneakers".to_string(), "Laces".to_string()];
        let doc = Document::from_fields(
            9,
            "Red Shoes",
            vec![
                FieldContent::PlainText("Comfortable  red running shoes".into()),
                FieldContent::RichText("<em>Waterproof</em>".into()),
                FieldContent::Keywords(vec!["sale".into(), " ".into(), "summer".into()]),
                FieldContent::relations(related),
                FieldContent::Table(vec![vec!["size".into(), "42".into()]]),
                FieldContent::PlainText(String::new()),
            ],
        );
        assert_eq!(doc.element_id, 9);
        assert_eq!(
            doc.body,
            "Comfortable red running shoes\nWaterproof\nsale summer\nSneakers Laces\nsize 42"
        );
    }
}
