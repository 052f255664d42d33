//! Term review: unknown terms submitted for curation and the approved
//! vocabulary (with synonyms) that feeds lexical matching.

mod sqlite;
mod types;

pub use sqlite::SqliteTermStore;
pub use types::*;

/// Trait for term review storage.
pub trait TermStore: Send + Sync {
    /// Record a term the matcher did not recognize.
    ///
    /// A term already present for the same type is not inserted again;
    /// the existing record is reported as `AlreadySubmitted`.
    fn submit_unknown(&self, submission: &UnknownTermSubmission)
        -> Result<SubmitOutcome, TermError>;

    /// List approved terms, optionally restricted to one type.
    fn approved(&self, term_type: Option<TermType>) -> Result<Vec<ApprovedTerm>, TermError>;

    /// Approve a term with its synonyms, creating it if it was never submitted.
    fn approve(
        &self,
        term: &str,
        term_type: TermType,
        synonyms: &[String],
    ) -> Result<ApprovedTerm, TermError>;
}
