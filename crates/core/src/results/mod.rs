//! Eligibility results - from single criterion verdicts to a patient summary.
//!
//! ```text
//! CriterionMatchResult ──┐
//! CriterionMatchResult ──┼─► TrialEligibilityResult ──┐
//! CriterionMatchResult ──┘                            ├─► PatientMatchResults
//!                            TrialEligibilityResult ──┘
//! ```
//!
//! Aggregation is a pure fold over already computed values; nothing here
//! calls back into the matchers.

mod criterion;
mod patient;
mod trial;

pub use criterion::{CriterionMatchResult, ExclusionStrength};
pub use patient::{MatchSummary, PatientMatchResults};
pub use trial::{TrialEligibilityResult, TrialStatus};

/// Clamp a confidence into [0, 1]. NaN becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
