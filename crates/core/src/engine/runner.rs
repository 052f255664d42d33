//! Patient run driver: lexical -> semantic -> aggregation.

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{Criterion, CriterionOutcome, MatchMethod, PatientTerms, Trial};
use crate::collections::chunk;
use crate::config::MatchingConfig;
use crate::matching::{overlaps_with_synonyms, SemanticMatch, SemanticMatchClient, SemanticQuery, SynonymTable};
use crate::metrics::{CRITERIA_EVALUATED, TRIALS_PER_RUN, TRIAL_VERDICTS};
use crate::results::{CriterionMatchResult, PatientMatchResults, TrialEligibilityResult, TrialStatus};

/// Reasoning attached to criteria decided by the lexical matcher.
pub const LEXICAL_MATCH_REASON: &str = "Lexical match";

/// Fold criterion outcomes into a trial status.
///
/// A criterion only rules the patient out when its verdict was reached
/// without an oracle failure. Failed criteria push the trial to review
/// unless another criterion already excludes it. No criteria means eligible.
pub fn derive_status(outcomes: &[CriterionOutcome]) -> TrialStatus {
    let excluded = outcomes
        .iter()
        .any(|o| !o.oracle_error && o.result.causes_ineligibility());
    if excluded {
        return TrialStatus::Ineligible;
    }

    if outcomes.iter().any(|o| o.oracle_error) {
        return TrialStatus::NeedsReview;
    }

    TrialStatus::Eligible
}

/// Evaluates patients against trials.
pub struct EligibilityEngine {
    config: MatchingConfig,
    synonyms: SynonymTable,
}

impl EligibilityEngine {
    pub fn new(config: MatchingConfig) -> Self {
        Self {
            config,
            synonyms: SynonymTable::new(),
        }
    }

    /// Expand patient terms through approved synonyms during lexical matching.
    pub fn with_synonyms(mut self, synonyms: SynonymTable) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Run one patient against every trial, in order.
    ///
    /// `semantic` is the client for this run only; its cache is shared by all
    /// criteria of the run. Failures never abort the run.
    pub async fn evaluate_patient(
        &self,
        patient_response: serde_json::Value,
        patient_terms: &PatientTerms,
        trials: &[Trial],
        semantic: Option<&SemanticMatchClient>,
    ) -> PatientMatchResults {
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            trials = trials.len(),
            semantic = semantic.is_some() && self.config.semantic_enabled,
            "Starting patient run"
        );
        if self.config.semantic_enabled && semantic.is_none() {
            warn!(%run_id, "Semantic matching enabled but no client provided, using lexical only");
        }

        let mut evaluated = Vec::with_capacity(trials.len());
        for trial in trials {
            let result = self.evaluate_trial(patient_terms, trial, semantic).await;
            TRIAL_VERDICTS
                .with_label_values(&[result.status().as_str()])
                .inc();
            debug!(
                %run_id,
                nct_id = %result.nct_id(),
                status = result.status().as_str(),
                confidence = result.confidence_score(),
                "Trial evaluated"
            );
            evaluated.push(result);
        }
        TRIALS_PER_RUN
            .with_label_values(&[])
            .observe(trials.len() as f64);

        let results = PatientMatchResults::from_trials(patient_response, evaluated);
        let summary = results.summary();
        info!(
            %run_id,
            total = summary.total_evaluated,
            eligible = summary.eligible,
            ineligible = summary.ineligible,
            needs_review = summary.needs_review,
            eligibility_rate = summary.eligibility_rate,
            "Patient run complete"
        );
        if let Some(client) = semantic {
            let stats = client.cache_stats();
            debug!(
                %run_id,
                cache_size = stats.size,
                hits = stats.hits,
                misses = stats.misses,
                "Semantic cache after run"
            );
        }

        results
    }

    /// Evaluate every criterion of one trial and derive its status.
    pub async fn evaluate_trial(
        &self,
        patient_terms: &PatientTerms,
        trial: &Trial,
        semantic: Option<&SemanticMatchClient>,
    ) -> TrialEligibilityResult {
        let mut outcomes = Vec::with_capacity(trial.criteria.len());
        for criterion in &trial.criteria {
            outcomes.push(
                self.evaluate_criterion(patient_terms, &trial.nct_id, criterion, semantic)
                    .await,
            );
        }

        let status = derive_status(&outcomes);
        TrialEligibilityResult::new(
            trial.nct_id.clone(),
            status,
            outcomes.into_iter().map(|o| o.result).collect(),
        )
    }

    /// Decide one criterion for one trial.
    pub async fn evaluate_criterion(
        &self,
        patient_terms: &PatientTerms,
        nct_id: &str,
        criterion: &Criterion,
        semantic: Option<&SemanticMatchClient>,
    ) -> CriterionOutcome {
        let patient = patient_terms.terms_for(&criterion.match_type);
        let criterion_terms = criterion.usable_terms();

        let outcome = if patient.is_empty() || criterion_terms.is_empty() {
            self.no_evidence(
                nct_id,
                criterion,
                format!("No {} terms to compare", criterion.match_type),
            )
        } else if overlaps_with_synonyms(patient, &criterion_terms, self.config.fuzzy, &self.synonyms) {
            CriterionOutcome {
                result: self
                    .result(nct_id, criterion, true, 1.0)
                    .with_reasoning(LEXICAL_MATCH_REASON),
                method: MatchMethod::Lexical,
                oracle_error: false,
            }
        } else {
            match semantic.filter(|_| self.config.semantic_enabled) {
                Some(client) => {
                    self.semantic_outcome(client, patient, &criterion_terms, nct_id, criterion)
                        .await
                }
                None => self.no_evidence(nct_id, criterion, "No lexical match".to_string()),
            }
        };

        CRITERIA_EVALUATED
            .with_label_values(&[outcome.method.as_str()])
            .inc();
        outcome
    }

    async fn semantic_outcome(
        &self,
        client: &SemanticMatchClient,
        patient: &[String],
        criterion_terms: &[String],
        nct_id: &str,
        criterion: &Criterion,
    ) -> CriterionOutcome {
        let queries: Vec<SemanticQuery> = patient
            .iter()
            .flat_map(|p| {
                criterion_terms.iter().map(move |c| {
                    SemanticQuery::new(p.as_str(), c.as_str())
                        .with_match_type(criterion.match_type.as_str())
                })
            })
            .collect();

        let batches = match chunk(&queries, self.config.batch_size) {
            Ok(batches) => batches,
            Err(e) => {
                warn!(error = %e, "Invalid semantic batch size, sending all queries at once");
                vec![queries]
            }
        };

        let mut verdicts: Vec<SemanticMatch> = Vec::new();
        for batch in &batches {
            verdicts.extend(client.batch_semantic_match(batch).await);
        }

        let (failed, successful): (Vec<&SemanticMatch>, Vec<&SemanticMatch>) =
            verdicts.iter().partition(|v| v.error);
        let best_positive = successful
            .iter()
            .filter(|v| v.matched)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        // A positive verdict stands even if other pairs failed.
        if let Some(verdict) = best_positive {
            return self.semantic_verdict(nct_id, criterion, verdict);
        }

        if let Some(first_failure) = failed.first() {
            warn!(
                nct_id,
                criterion_id = %criterion.id,
                failed = failed.len(),
                queries = verdicts.len(),
                "Semantic queries failed without a positive verdict, criterion needs review"
            );
            return CriterionOutcome {
                result: self.result(nct_id, criterion, false, 0.0).with_reasoning(format!(
                    "Semantic matching failed for {} of {} queries: {}",
                    failed.len(),
                    verdicts.len(),
                    first_failure.reasoning
                )),
                method: MatchMethod::Semantic,
                oracle_error: true,
            };
        }

        match successful
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        {
            Some(verdict) => self.semantic_verdict(nct_id, criterion, verdict),
            None => self.no_evidence(nct_id, criterion, "No semantic queries to run".to_string()),
        }
    }

    fn semantic_verdict(
        &self,
        nct_id: &str,
        criterion: &Criterion,
        verdict: &SemanticMatch,
    ) -> CriterionOutcome {
        CriterionOutcome {
            result: self
                .result(nct_id, criterion, verdict.matched, verdict.confidence)
                .with_reasoning(verdict.reasoning.clone()),
            method: MatchMethod::Semantic,
            oracle_error: false,
        }
    }

    fn no_evidence(&self, nct_id: &str, criterion: &Criterion, reason: String) -> CriterionOutcome {
        CriterionOutcome {
            result: self
                .result(nct_id, criterion, false, self.config.lexical_miss_confidence)
                .with_reasoning(reason),
            method: MatchMethod::NoEvidence,
            oracle_error: false,
        }
    }

    fn result(
        &self,
        nct_id: &str,
        criterion: &Criterion,
        matches: bool,
        confidence: f64,
    ) -> CriterionMatchResult {
        CriterionMatchResult::new(criterion.id.clone(), nct_id, matches, confidence)
            .with_exclusion_strength(criterion.exclusion_strength)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::matching::{LlmError, SemanticOptions};
    use crate::results::ExclusionStrength;
    use crate::testing::{fixtures, MockLlmClient};
    use serde_json::json;

    fn lexical_only() -> EligibilityEngine {
        EligibilityEngine::new(MatchingConfig {
            semantic_enabled: false,
            ..MatchingConfig::default()
        })
    }

    fn conditions(terms: &[&str]) -> PatientTerms {
        PatientTerms::from_entries(terms.iter().map(|t| ("condition", *t)))
    }

    fn outcome(matches: bool, strength: ExclusionStrength, oracle_error: bool) -> CriterionOutcome {
        CriterionOutcome {
            result: CriterionMatchResult::new("c", "NCT001", matches, 0.9)
                .with_exclusion_strength(strength),
            method: MatchMethod::Semantic,
            oracle_error,
        }
    }

    #[test]
    fn test_derive_status_empty_is_eligible() {
        assert_eq!(derive_status(&[]), TrialStatus::Eligible);
    }

    #[test]
    fn test_derive_status_exclusion_match_is_ineligible() {
        let outcomes = vec![
            outcome(false, ExclusionStrength::Exclusion, false),
            outcome(true, ExclusionStrength::Exclusion, false),
        ];
        assert_eq!(derive_status(&outcomes), TrialStatus::Ineligible);
    }

    #[test]
    fn test_derive_status_failed_criterion_needs_review() {
        // The failed inclusion criterion would cause ineligibility if trusted
        let outcomes = vec![
            outcome(false, ExclusionStrength::Exclusion, false),
            outcome(false, ExclusionStrength::Inclusion, true),
        ];
        assert_eq!(derive_status(&outcomes), TrialStatus::NeedsReview);
    }

    #[test]
    fn test_derive_status_ineligible_wins_over_review() {
        let outcomes = vec![
            outcome(false, ExclusionStrength::Exclusion, true),
            outcome(true, ExclusionStrength::Exclusion, false),
        ];
        assert_eq!(derive_status(&outcomes), TrialStatus::Ineligible);
    }

    #[tokio::test]
    async fn test_lexical_hit() {
        let engine = lexical_only();
        let criterion = fixtures::exclusion("c1", &["tumor"]);

        let outcome = engine
            .evaluate_criterion(&conditions(&["malignant tumors"]), "NCT001", &criterion, None)
            .await;

        assert_eq!(outcome.method, MatchMethod::Lexical);
        assert!(outcome.result.matches());
        assert_eq!(outcome.result.confidence(), 1.0);
        assert_eq!(outcome.result.reasoning(), Some(LEXICAL_MATCH_REASON));
    }

    #[tokio::test]
    async fn test_lexical_miss_uses_configured_confidence() {
        let engine = EligibilityEngine::new(MatchingConfig {
            semantic_enabled: false,
            lexical_miss_confidence: 0.6,
            ..MatchingConfig::default()
        });
        let criterion = fixtures::exclusion("c1", &["hepatitis"]);

        let outcome = engine
            .evaluate_criterion(&conditions(&["asthma"]), "NCT001", &criterion, None)
            .await;

        assert_eq!(outcome.method, MatchMethod::NoEvidence);
        assert!(!outcome.result.matches());
        assert_eq!(outcome.result.confidence(), 0.6);
    }

    #[tokio::test]
    async fn test_missing_patient_terms_is_non_match() {
        let engine = EligibilityEngine::new(MatchingConfig::default());
        let oracle = Arc::new(MockLlmClient::new());
        let client = SemanticMatchClient::with_oracle(oracle.clone(), SemanticOptions::default());
        let criterion = fixtures::exclusion("c1", &["insulin"]).with_match_type("treatment");

        let outcome = engine
            .evaluate_criterion(&conditions(&["diabetes"]), "NCT001", &criterion, Some(&client))
            .await;

        assert_eq!(outcome.method, MatchMethod::NoEvidence);
        assert_eq!(outcome.result.confidence(), 0.8);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_synonyms_give_lexical_hit() {
        let mut synonyms = SynonymTable::new();
        synonyms.add_group("hypertension", &["high blood pressure".to_string()]);
        let engine = lexical_only().with_synonyms(synonyms);
        let criterion = fixtures::exclusion("c1", &["hypertension"]);

        let outcome = engine
            .evaluate_criterion(&conditions(&["High Blood Pressure"]), "NCT001", &criterion, None)
            .await;

        assert_eq!(outcome.method, MatchMethod::Lexical);
        assert!(outcome.result.matches());
    }

    #[tokio::test]
    async fn test_semantic_prefers_best_positive() {
        let engine = EligibilityEngine::new(MatchingConfig::default());
        let oracle = Arc::new(MockLlmClient::with_responder(fixtures::pair_responder(vec![(
            "heart attack",
            "myocardial infarction",
        )])));
        let client = SemanticMatchClient::with_oracle(oracle.clone(), SemanticOptions::default());
        let criterion = fixtures::exclusion("c1", &["myocardial infarction", "stroke"]);

        let outcome = engine
            .evaluate_criterion(
                &conditions(&["heart attack", "asthma"]),
                "NCT001",
                &criterion,
                Some(&client),
            )
            .await;

        assert_eq!(outcome.method, MatchMethod::Semantic);
        assert!(outcome.result.matches());
        assert_eq!(outcome.result.confidence(), 0.92);
        assert!(!outcome.oracle_error);
        assert_eq!(oracle.call_count(), 4);
    }

    #[tokio::test]
    async fn test_semantic_negative_when_no_pair_matches() {
        let engine = EligibilityEngine::new(MatchingConfig::default());
        let oracle = Arc::new(MockLlmClient::with_responder(fixtures::pair_responder(vec![])));
        let client = SemanticMatchClient::with_oracle(oracle, SemanticOptions::default());
        let criterion = fixtures::inclusion("c1", &["copd"]);

        let outcome = engine
            .evaluate_criterion(&conditions(&["asthma"]), "NCT001", &criterion, Some(&client))
            .await;

        assert!(!outcome.result.matches());
        assert_eq!(outcome.result.confidence(), 0.85);
        assert!(outcome.result.causes_ineligibility());
    }

    #[tokio::test]
    async fn test_all_oracle_errors_flag_review() {
        let engine = EligibilityEngine::new(MatchingConfig::default());
        let oracle = Arc::new(MockLlmClient::new());
        oracle.push_error(LlmError::Api {
            status: 529,
            message: "overloaded".to_string(),
        });
        let client = SemanticMatchClient::with_oracle(oracle, SemanticOptions::default());
        let trial = fixtures::trial("NCT009", vec![fixtures::exclusion("c1", &["copd"])]);

        let result = engine
            .evaluate_trial(&conditions(&["asthma"]), &trial, Some(&client))
            .await;

        assert_eq!(result.status(), TrialStatus::NeedsReview);
        let criterion = &result.matched_criteria()[0];
        assert_eq!(criterion.confidence(), 0.0);
        assert!(criterion.reasoning().unwrap().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_partial_failure_without_positive_needs_review() {
        let engine = EligibilityEngine::new(MatchingConfig::default());
        let oracle = Arc::new(MockLlmClient::new());
        oracle.push_error(LlmError::Http("connection reset".to_string()));
        oracle.push_response(fixtures::verdict_json(false, 0.9));
        let client = SemanticMatchClient::with_oracle(oracle.clone(), SemanticOptions::default());
        let trial = fixtures::trial(
            "NCT010",
            vec![fixtures::exclusion("c1", &["copd", "emphysema"])],
        );

        let result = engine
            .evaluate_trial(&conditions(&["asthma"]), &trial, Some(&client))
            .await;

        assert_eq!(oracle.call_count(), 2);
        assert_eq!(result.status(), TrialStatus::NeedsReview);
        let criterion = &result.matched_criteria()[0];
        assert!(!criterion.matches());
        assert_eq!(criterion.confidence(), 0.0);
        let reasoning = criterion.reasoning().unwrap();
        assert!(reasoning.contains("1 of 2"));
        assert!(reasoning.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_partial_failure_with_positive_decides() {
        let engine = EligibilityEngine::new(MatchingConfig::default());
        let oracle = Arc::new(MockLlmClient::new());
        oracle.push_error(LlmError::Http("connection reset".to_string()));
        oracle.push_response(fixtures::verdict_json(true, 0.88));
        let client = SemanticMatchClient::with_oracle(oracle, SemanticOptions::default());
        let criterion = fixtures::exclusion("c1", &["copd", "emphysema"]);

        let outcome = engine
            .evaluate_criterion(&conditions(&["asthma"]), "NCT011", &criterion, Some(&client))
            .await;

        assert!(!outcome.oracle_error);
        assert!(outcome.result.matches());
        assert_eq!(outcome.result.confidence(), 0.88);
        assert!(outcome.result.causes_ineligibility());
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let engine = EligibilityEngine::new(MatchingConfig {
            batch_size: 2,
            ..MatchingConfig::default()
        });
        let oracle = Arc::new(MockLlmClient::with_responder(fixtures::pair_responder(vec![])));
        let client = SemanticMatchClient::with_oracle(oracle.clone(), SemanticOptions::default());
        let criterion = fixtures::exclusion("c1", &["copd", "emphysema", "bronchitis"]);

        engine
            .evaluate_criterion(&conditions(&["asthma"]), "NCT001", &criterion, Some(&client))
            .await;

        assert_eq!(oracle.call_count(), 3);
        assert_eq!(client.cache_stats().misses, 3);
    }

    #[tokio::test]
    async fn test_evaluate_patient_buckets() {
        let engine = lexical_only();
        let trials = vec![
            fixtures::trial("NCT001", vec![fixtures::exclusion("c1", &["asthma"])]),
            fixtures::trial("NCT002", vec![fixtures::inclusion("c1", &["asthma"])]),
            fixtures::trial("NCT003", vec![]),
        ];

        let results = engine
            .evaluate_patient(json!({"id": "p1"}), &conditions(&["asthma"]), &trials, None)
            .await;

        assert_eq!(results.ineligible_trials()[0].nct_id(), "NCT001");
        let eligible: Vec<&str> = results.eligible_trials().iter().map(|t| t.nct_id()).collect();
        assert_eq!(eligible, vec!["NCT002", "NCT003"]);
        assert_eq!(results.total_trials_evaluated(), 3);
        assert_eq!(results.patient_response(), &json!({"id": "p1"}));
    }
}
