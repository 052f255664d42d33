//! Testing utilities and mock implementations.
//!
//! Lets the engine and the HTTP layer run end to end against a scripted
//! oracle instead of the real API.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trialmatch_core::testing::{fixtures, MockLlmClient};
//! use trialmatch_core::{SemanticMatchClient, SemanticOptions};
//!
//! let oracle = Arc::new(MockLlmClient::with_response(fixtures::verdict_json(true, 0.9)));
//! let client = SemanticMatchClient::with_oracle(oracle.clone(), SemanticOptions::default());
//! ```

mod mock_llm;

pub use mock_llm::MockLlmClient;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::engine::{Criterion, Trial};
    use crate::matching::{CompletionRequest, LlmError};
    use crate::results::ExclusionStrength;

    /// Oracle response text for a verdict.
    pub fn verdict_json(matched: bool, confidence: f64) -> String {
        format!(
            r#"{{"match": {}, "confidence": {}, "reasoning": "fixture verdict"}}"#,
            matched, confidence
        )
    }

    /// Create an exclusion criterion for condition terms.
    pub fn exclusion(id: &str, terms: &[&str]) -> Criterion {
        Criterion::new(id, terms.iter().map(|t| t.to_string()).collect())
            .with_strength(ExclusionStrength::Exclusion)
    }

    /// Create an inclusion criterion for condition terms.
    pub fn inclusion(id: &str, terms: &[&str]) -> Criterion {
        Criterion::new(id, terms.iter().map(|t| t.to_string()).collect())
            .with_strength(ExclusionStrength::Inclusion)
    }

    /// Create a trial with the given criteria.
    pub fn trial(nct_id: &str, criteria: Vec<Criterion>) -> Trial {
        Trial::new(nct_id, criteria)
    }

    /// Pull the quoted patient and criterion terms out of an oracle prompt.
    pub fn prompt_terms(request: &CompletionRequest) -> Option<(String, String)> {
        let quoted = |label: &str| -> Option<String> {
            let line = request.prompt.lines().find(|l| l.starts_with(label))?;
            let value = line[label.len()..].trim().trim_matches('"');
            Some(value.to_string())
        };
        Some((quoted("Patient term:")?, quoted("Trial criterion term:")?))
    }

    /// Oracle responder that declares a match only for the listed pairs.
    pub fn pair_responder(
        pairs: Vec<(&'static str, &'static str)>,
    ) -> impl Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static {
        move |request| {
            let (patient, criterion) = prompt_terms(request)
                .ok_or_else(|| LlmError::Json("prompt without terms".to_string()))?;
            let matched = pairs.iter().any(|(p, c)| {
                p.eq_ignore_ascii_case(&patient) && c.eq_ignore_ascii_case(&criterion)
            });
            Ok(verdict_json(matched, if matched { 0.92 } else { 0.85 }))
        }
    }
}
