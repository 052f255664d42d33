use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::{TrialEligibilityResult, TrialStatus};

/// Counts over one patient run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSummary {
    pub total_evaluated: usize,
    pub eligible: usize,
    pub ineligible: usize,
    pub needs_review: usize,
    /// Percentage of eligible trials, one decimal digit.
    pub eligibility_rate: f64,
}

/// The terminal aggregate of a matching run for one patient.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientMatchResults {
    patient_response: serde_json::Value,
    eligible_trials: Vec<TrialEligibilityResult>,
    ineligible_trials: Vec<TrialEligibilityResult>,
    needs_review_trials: Vec<TrialEligibilityResult>,
    timestamp: DateTime<Utc>,
}

impl PatientMatchResults {
    /// Build from pre-sorted buckets. Each trial must appear in one bucket only.
    pub fn new(
        patient_response: serde_json::Value,
        eligible_trials: Vec<TrialEligibilityResult>,
        ineligible_trials: Vec<TrialEligibilityResult>,
        needs_review_trials: Vec<TrialEligibilityResult>,
    ) -> Self {
        Self {
            patient_response,
            eligible_trials,
            ineligible_trials,
            needs_review_trials,
            timestamp: Utc::now(),
        }
    }

    /// Route each trial into the bucket named by its status, keeping order.
    pub fn from_trials(
        patient_response: serde_json::Value,
        trials: impl IntoIterator<Item = TrialEligibilityResult>,
    ) -> Self {
        let mut eligible = Vec::new();
        let mut ineligible = Vec::new();
        let mut needs_review = Vec::new();

        for trial in trials {
            match trial.status() {
                TrialStatus::Eligible => eligible.push(trial),
                TrialStatus::Ineligible => ineligible.push(trial),
                TrialStatus::NeedsReview => needs_review.push(trial),
            }
        }

        Self::new(patient_response, eligible, ineligible, needs_review)
    }

    pub fn patient_response(&self) -> &serde_json::Value {
        &self.patient_response
    }

    pub fn eligible_trials(&self) -> &[TrialEligibilityResult] {
        &self.eligible_trials
    }

    pub fn ineligible_trials(&self) -> &[TrialEligibilityResult] {
        &self.ineligible_trials
    }

    pub fn needs_review_trials(&self) -> &[TrialEligibilityResult] {
        &self.needs_review_trials
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn total_trials_evaluated(&self) -> usize {
        self.eligible_trials.len() + self.ineligible_trials.len() + self.needs_review_trials.len()
    }

    pub fn summary(&self) -> MatchSummary {
        let total = self.total_trials_evaluated();
        let eligible = self.eligible_trials.len();
        let eligibility_rate = if total == 0 {
            0.0
        } else {
            let percent = eligible as f64 / total as f64 * 100.0;
            (percent * 10.0).round() / 10.0
        };

        MatchSummary {
            total_evaluated: total,
            eligible,
            ineligible: self.ineligible_trials.len(),
            needs_review: self.needs_review_trials.len(),
            eligibility_rate,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientMatchResultsJson<'a> {
    timestamp: DateTime<Utc>,
    summary: MatchSummary,
    eligible_trials: &'a [TrialEligibilityResult],
    ineligible_trials: &'a [TrialEligibilityResult],
    needs_review_trials: &'a [TrialEligibilityResult],
    patient_response: &'a serde_json::Value,
}

impl Serialize for PatientMatchResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PatientMatchResultsJson {
            timestamp: self.timestamp,
            summary: self.summary(),
            eligible_trials: &self.eligible_trials,
            ineligible_trials: &self.ineligible_trials,
            needs_review_trials: &self.needs_review_trials,
            patient_response: &self.patient_response,
        }
        .serialize(serializer)
    }
}
