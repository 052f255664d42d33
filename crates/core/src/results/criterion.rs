use serde::{Deserialize, Serialize, Serializer};

use super::clamp_confidence;

/// Whether satisfying a criterion excludes the patient or is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionStrength {
    /// The patient must match to be eligible.
    Inclusion,
    /// Matching makes the patient ineligible.
    #[default]
    Exclusion,
}

/// One evaluation of one criterion against one trial.
///
/// Confidence is clamped once, at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionMatchResult {
    criterion_id: String,
    nct_id: String,
    matches: bool,
    confidence: f64,
    exclusion_strength: ExclusionStrength,
    reasoning: Option<String>,
}

impl CriterionMatchResult {
    /// Create an exclusion-strength result.
    pub fn new(
        criterion_id: impl Into<String>,
        nct_id: impl Into<String>,
        matches: bool,
        confidence: f64,
    ) -> Self {
        Self {
            criterion_id: criterion_id.into(),
            nct_id: nct_id.into(),
            matches,
            confidence: clamp_confidence(confidence),
            exclusion_strength: ExclusionStrength::default(),
            reasoning: None,
        }
    }

    pub fn with_exclusion_strength(mut self, strength: ExclusionStrength) -> Self {
        self.exclusion_strength = strength;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn criterion_id(&self) -> &str {
        &self.criterion_id
    }

    pub fn nct_id(&self) -> &str {
        &self.nct_id
    }

    pub fn matches(&self) -> bool {
        self.matches
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn exclusion_strength(&self) -> ExclusionStrength {
        self.exclusion_strength
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    /// A matched exclusion or an unmatched inclusion rules the patient out.
    pub fn causes_ineligibility(&self) -> bool {
        match self.exclusion_strength {
            ExclusionStrength::Exclusion => self.matches,
            ExclusionStrength::Inclusion => !self.matches,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CriterionMatchResultJson<'a> {
    criterion_id: &'a str,
    nct_id: &'a str,
    matches: bool,
    confidence: f64,
    exclusion_strength: ExclusionStrength,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<&'a str>,
    causes_ineligibility: bool,
}

impl Serialize for CriterionMatchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CriterionMatchResultJson {
            criterion_id: &self.criterion_id,
            nct_id: &self.nct_id,
            matches: self.matches,
            confidence: self.confidence,
            exclusion_strength: self.exclusion_strength,
            reasoning: self.reasoning.as_deref(),
            causes_ineligibility: self.causes_ineligibility(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped_on_construction() {
        for (input, expected) in [(-0.5, 0.0), (0.0, 0.0), (0.73, 0.73), (1.0, 1.0), (1.2, 1.0)] {
            let result = CriterionMatchResult::new("c1", "NCT001", true, input);
            assert_eq!(result.confidence(), expected, "input {}", input);
        }
    }

    #[test]
    fn test_default_strength_is_exclusion() {
        let result = CriterionMatchResult::new("c1", "NCT001", false, 1.0);
        assert_eq!(result.exclusion_strength(), ExclusionStrength::Exclusion);
        assert!(result.reasoning().is_none());
    }

    #[test]
    fn test_causes_ineligibility_all_combinations() {
        let build = |strength, matches| {
            CriterionMatchResult::new("c1", "NCT001", matches, 1.0)
                .with_exclusion_strength(strength)
                .causes_ineligibility()
        };

        assert!(build(ExclusionStrength::Exclusion, true));
        assert!(!build(ExclusionStrength::Exclusion, false));
        assert!(!build(ExclusionStrength::Inclusion, true));
        assert!(build(ExclusionStrength::Inclusion, false));
    }

    #[test]
    fn test_serialization_includes_derived_flag() {
        let result = CriterionMatchResult::new("age-min", "NCT04000000", false, 0.9)
            .with_exclusion_strength(ExclusionStrength::Inclusion)
            .with_reasoning("Patient is younger than 18");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["criterionId"], "age-min");
        assert_eq!(json["nctId"], "NCT04000000");
        assert_eq!(json["matches"], false);
        assert_eq!(json["confidence"], 0.9);
        assert_eq!(json["exclusionStrength"], "inclusion");
        assert_eq!(json["reasoning"], "Patient is younger than 18");
        assert_eq!(json["causesIneligibility"], true);
    }

    #[test]
    fn test_serialization_is_repeatable() {
        let result = CriterionMatchResult::new("c1", "NCT001", true, 0.5);
        let first = serde_json::to_string(&result).unwrap();
        let second = serde_json::to_string(&result).unwrap();
        assert_eq!(first, second);
        assert!(!first.contains("reasoning"));
    }
}
