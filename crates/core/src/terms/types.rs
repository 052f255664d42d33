//! Types for the term review store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of medical term under review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermType {
    Condition,
    Treatment,
}

impl TermType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermType::Condition => "condition",
            TermType::Treatment => "treatment",
        }
    }
}

impl fmt::Display for TermType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TermType {
    type Err = TermError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "condition" => Ok(TermType::Condition),
            "treatment" => Ok(TermType::Treatment),
            _ => Err(TermError::Validation(
                "Invalid type. Must be \"condition\" or \"treatment\"".to_string(),
            )),
        }
    }
}

/// Errors from term review.
#[derive(Debug, Error)]
pub enum TermError {
    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for TermError {
    fn from(e: rusqlite::Error) -> Self {
        TermError::Database(e.to_string())
    }
}

/// A validated submission of an unrecognized term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTermSubmission {
    term: String,
    term_type: TermType,
    context: Option<String>,
}

impl UnknownTermSubmission {
    /// Validate raw request fields. The term is trimmed and lower-cased.
    pub fn new(
        term: Option<&str>,
        term_type: Option<&str>,
        context: Option<String>,
    ) -> Result<Self, TermError> {
        let (Some(term), Some(term_type)) = (term, term_type) else {
            return Err(TermError::Validation(
                "Missing required fields: term and type".to_string(),
            ));
        };

        let term_type: TermType = term_type.parse()?;
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Err(TermError::Validation("Term must not be empty".to_string()));
        }

        Ok(Self {
            term,
            term_type,
            context: context.filter(|c| !c.trim().is_empty()),
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn term_type(&self) -> TermType {
        self.term_type
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }
}

/// Result of submitting an unknown term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Created { id: i64 },
    AlreadySubmitted { id: i64 },
}

impl SubmitOutcome {
    pub fn id(&self) -> i64 {
        match self {
            SubmitOutcome::Created { id } | SubmitOutcome::AlreadySubmitted { id } => *id,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SubmitOutcome::Created { .. } => "Term submitted for review",
            SubmitOutcome::AlreadySubmitted { .. } => "Term already submitted for review",
        }
    }
}

/// Review state of a stored term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
        }
    }
}

/// A curated term with its synonyms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedTerm {
    pub id: i64,
    pub term: String,
    #[serde(rename = "type")]
    pub term_type: TermType,
    pub synonyms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}
