//! Shared types for semantic matching.

use serde::{Deserialize, Serialize};

/// Match type used when a caller does not name one.
pub const DEFAULT_MATCH_TYPE: &str = "condition";

/// Verdict returned by the semantic match client.
///
/// Runtime failures are reported in-band through `error` so that one bad
/// comparison never aborts a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticMatch {
    #[serde(rename = "match")]
    pub matched: bool,
    pub confidence: f64,
    pub reasoning: String,
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl SemanticMatch {
    /// A failed comparison: non-match with zero confidence.
    pub fn failed(reasoning: impl Into<String>) -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            reasoning: reasoning.into(),
            from_cache: false,
            error: true,
        }
    }
}

/// One pair of terms to compare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticQuery {
    pub patient_term: String,
    pub criterion_term: String,
    #[serde(default = "default_match_type")]
    pub match_type: String,
}

fn default_match_type() -> String {
    DEFAULT_MATCH_TYPE.to_string()
}

impl SemanticQuery {
    pub fn new(patient_term: impl Into<String>, criterion_term: impl Into<String>) -> Self {
        Self {
            patient_term: patient_term.into(),
            criterion_term: criterion_term.into(),
            match_type: default_match_type(),
        }
    }

    pub fn with_match_type(mut self, match_type: impl Into<String>) -> Self {
        self.match_type = match_type.into();
        self
    }
}

/// Cache key: the normalized (patient term, criterion term, match type) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub patient_term: String,
    pub criterion_term: String,
    pub match_type: String,
}

impl CacheKey {
    pub fn new(patient_term: &str, criterion_term: &str, match_type: &str) -> Self {
        Self {
            patient_term: normalize(patient_term),
            criterion_term: normalize(criterion_term),
            match_type: normalize(match_type),
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A successful oracle verdict as kept in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedVerdict {
    #[serde(rename = "match")]
    pub matched: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl CachedVerdict {
    pub fn to_match(&self, from_cache: bool) -> SemanticMatch {
        SemanticMatch {
            matched: self.matched,
            confidence: self.confidence,
            reasoning: self.reasoning.clone(),
            from_cache,
            error: false,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(size: usize, hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            size,
            hits,
            misses,
            hit_rate,
        }
    }
}
