use serde::{Deserialize, Serialize, Serializer};

use super::CriterionMatchResult;

/// Eligibility verdict for a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrialStatus {
    Eligible,
    Ineligible,
    NeedsReview,
}

impl TrialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrialStatus::Eligible => "eligible",
            TrialStatus::Ineligible => "ineligible",
            TrialStatus::NeedsReview => "needsReview",
        }
    }
}

/// Aggregate verdict for one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialEligibilityResult {
    nct_id: String,
    status: TrialStatus,
    matched_criteria: Vec<CriterionMatchResult>,
}

impl TrialEligibilityResult {
    /// Criteria are kept in evaluation order.
    pub fn new(
        nct_id: impl Into<String>,
        status: TrialStatus,
        matched_criteria: Vec<CriterionMatchResult>,
    ) -> Self {
        Self {
            nct_id: nct_id.into(),
            status,
            matched_criteria,
        }
    }

    pub fn nct_id(&self) -> &str {
        &self.nct_id
    }

    pub fn status(&self) -> TrialStatus {
        self.status
    }

    pub fn matched_criteria(&self) -> &[CriterionMatchResult] {
        &self.matched_criteria
    }

    /// Mean confidence over all criteria; 1.0 when there are none.
    pub fn confidence_score(&self) -> f64 {
        if self.matched_criteria.is_empty() {
            return 1.0;
        }
        let total: f64 = self.matched_criteria.iter().map(|c| c.confidence()).sum();
        total / self.matched_criteria.len() as f64
    }

    /// Criteria that rule the patient out, in evaluation order.
    pub fn ineligibility_criteria(&self) -> Vec<&CriterionMatchResult> {
        self.matched_criteria
            .iter()
            .filter(|c| c.causes_ineligibility())
            .collect()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrialEligibilityResultJson<'a> {
    nct_id: &'a str,
    status: TrialStatus,
    matched_criteria: &'a [CriterionMatchResult],
    confidence_score: f64,
}

impl Serialize for TrialEligibilityResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TrialEligibilityResultJson {
            nct_id: &self.nct_id,
            status: self.status,
            matched_criteria: &self.matched_criteria,
            confidence_score: self.confidence_score(),
        }
        .serialize(serializer)
    }
}
