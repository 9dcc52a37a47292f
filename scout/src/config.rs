//! Engine configuration
//!
//! Built once at startup and passed by reference into the analyzer, query
//! parser, scorer and highlighter. Every section deserializes with defaults,
//! so a partial JSON document is a valid configuration.

use crate::interface::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AnalyzerConfig {
    #[validate(range(min = 1, max = 64))]
    pub min_word_length: usize,
    pub stop_words_enabled: bool,
    #[validate(custom = "validate_ngram_sizes")]
    pub ngram_sizes: Vec<usize>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_word_length: 2,
            stop_words_enabled: true,
            ngram_sizes: vec![2, 3],
        }
    }
}

fn validate_ngram_sizes(sizes: &[usize]) -> Result<(), ValidationError> {
    if sizes.is_empty() || sizes.iter().any(|&n| n == 0 || n > 8) {
        return Err(ValidationError::new("ngram_sizes must be non-empty with sizes in 1..=8"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ScoringConfig {
    #[validate(range(min = 0.0, max = 10.0))]
    pub k1: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub b: f64,
    #[validate(range(min = 0.0))]
    pub title_boost: f64,
    #[validate(range(min = 0.0))]
    pub exact_match_boost: f64,
    #[validate(range(min = 0.0))]
    pub phrase_boost: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            title_boost: 5.0,
            exact_match_boost: 3.0,
            phrase_boost: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FuzzyConfig {
    pub enabled: bool,
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f64,
    #[validate(range(min = 1, max = 10000))]
    pub max_candidates: usize,
    /// Budget for fuzzy expansion of one query, in milliseconds
    pub timeout_ms: u64,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: 0.5,
            max_candidates: 100,
            timeout_ms: 250,
        }
    }
}

impl FuzzyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HighlightConfig {
    #[validate(length(min = 1, max = 32), custom = "validate_tag")]
    pub tag: String,
    pub class: Option<String>,
    #[validate(range(min = 10, max = 10000))]
    pub snippet_length: usize,
    #[validate(range(min = 1, max = 100))]
    pub max_snippets: usize,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            tag: "mark".to_string(),
            class: None,
            snippet_length: 160,
            max_snippets: 3,
        }
    }
}

fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    if !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::new("tag must be a plain element name"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 512,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SearchConfig {
    #[validate(range(min = 1))]
    pub default_limit: usize,
    #[validate(range(min = 1))]
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct EngineConfig {
    #[validate]
    pub analyzer: AnalyzerConfig,
    #[validate]
    pub scoring: ScoringConfig,
    #[validate]
    pub fuzzy: FuzzyConfig,
    #[validate]
    pub highlight: HighlightConfig,
    #[validate]
    pub cache: CacheConfig,
    #[validate]
    pub search: SearchConfig,
}

impl EngineConfig {
    /// Check ranges and cross-field constraints.
    pub fn validated(self) -> Result<Self, EngineError> {
        self.validate().map_err(|e| EngineError::Config(e.to_string()))?;
        if self.search.default_limit > self.search.max_limit {
            return Err(EngineError::Config(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                self.search.default_limit, self.search.max_limit
            )));
        }
        Ok(self)
    }

    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validated()
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }
}
