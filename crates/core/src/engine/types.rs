//! Input and intermediate types for the eligibility engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::collections::{group_by, unique_by};
use crate::matching::DEFAULT_MATCH_TYPE;
use crate::results::{CriterionMatchResult, ExclusionStrength};

fn default_match_type() -> String {
    DEFAULT_MATCH_TYPE.to_string()
}

/// A single eligibility rule within a trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    /// Terms the criterion is expressed in.
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub exclusion_strength: ExclusionStrength,
    /// Which patient term list this criterion is compared against.
    #[serde(default = "default_match_type")]
    pub match_type: String,
}

impl Criterion {
    /// Create an exclusion criterion on condition terms.
    pub fn new(id: impl Into<String>, terms: Vec<String>) -> Self {
        Self {
            id: id.into(),
            terms,
            exclusion_strength: ExclusionStrength::default(),
            match_type: default_match_type(),
        }
    }

    pub fn with_strength(mut self, strength: ExclusionStrength) -> Self {
        self.exclusion_strength = strength;
        self
    }

    pub fn with_match_type(mut self, match_type: impl Into<String>) -> Self {
        self.match_type = match_type.into();
        self
    }

    /// Criterion terms with blanks removed.
    pub fn usable_terms(&self) -> Vec<String> {
        self.terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A clinical trial and its ordered criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub nct_id: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
}

impl Trial {
    pub fn new(nct_id: impl Into<String>, criteria: Vec<Criterion>) -> Self {
        Self {
            nct_id: nct_id.into(),
            criteria,
        }
    }
}

/// Patient terms grouped by match type (e.g. "condition", "treatment").
///
/// Match types are lower-cased; terms are trimmed, blanks dropped and
/// case-insensitive duplicates removed (first spelling kept).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, Vec<String>>", into = "HashMap<String, Vec<String>>")]
pub struct PatientTerms {
    by_type: HashMap<String, Vec<String>>,
}

impl PatientTerms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from flat `(match_type, term)` pairs.
    pub fn from_entries<T, U>(entries: impl IntoIterator<Item = (T, U)>) -> Self
    where
        T: AsRef<str>,
        U: AsRef<str>,
    {
        let grouped = group_by(
            entries
                .into_iter()
                .map(|(t, term)| (t.as_ref().trim().to_lowercase(), term.as_ref().to_string())),
            |(t, _)| t.clone(),
        );

        let mut terms = Self::new();
        for (match_type, pairs) in grouped {
            terms.insert(&match_type, pairs.into_iter().map(|(_, term)| term));
        }
        terms
    }

    /// Add terms for a match type, merging with any already present.
    pub fn insert(&mut self, match_type: &str, terms: impl IntoIterator<Item = String>) {
        let entry = self
            .by_type
            .entry(match_type.trim().to_lowercase())
            .or_default();
        let merged = std::mem::take(entry).into_iter().chain(
            terms
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        );
        *entry = unique_by(merged, |t| t.to_lowercase());
    }

    /// Terms for one match type; empty when the patient reported none.
    pub fn terms_for(&self, match_type: &str) -> &[String] {
        self.by_type
            .get(&match_type.trim().to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(Vec::is_empty)
    }
}

impl From<HashMap<String, Vec<String>>> for PatientTerms {
    fn from(map: HashMap<String, Vec<String>>) -> Self {
        let mut terms = Self::new();
        for (match_type, list) in map {
            terms.insert(&match_type, list);
        }
        terms
    }
}

impl From<PatientTerms> for HashMap<String, Vec<String>> {
    fn from(terms: PatientTerms) -> Self {
        terms.by_type
    }
}

/// Which step of the pipeline decided a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    Lexical,
    Semantic,
    /// Neither matcher produced evidence; the configured miss confidence applies.
    NoEvidence,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Lexical => "lexical",
            MatchMethod::Semantic => "semantic",
            MatchMethod::NoEvidence => "none",
        }
    }
}

/// The verdict for one criterion plus how it was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionOutcome {
    pub result: CriterionMatchResult,
    pub method: MatchMethod,
    /// Every oracle call for this criterion failed.
    pub oracle_error: bool,
}
