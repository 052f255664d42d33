//! Eligibility engine - drives one patient run over a set of trials.
//!
//! Each criterion goes through the lexical matcher first (fuzzy, with
//! approved synonyms). Inconclusive criteria are handed to the semantic
//! client when one is available; per-criterion verdicts are then folded
//! into a trial status and bucketed into [`PatientMatchResults`].
//!
//! [`PatientMatchResults`]: crate::results::PatientMatchResults

mod runner;
mod types;

pub use runner::{derive_status, EligibilityEngine, LEXICAL_MATCH_REASON};
pub use types::*;
