//! Lexical overlap matching between patient terms and criterion terms.
//!
//! This is the cheap first filter in front of the semantic oracle. Exact mode
//! compares terms case-insensitively; fuzzy mode also accepts substring
//! containment in either direction and shared words longer than
//! [`MIN_SHARED_WORD_LEN`] characters, so "malignant tumors" overlaps "tumor"
//! while "the cat" vs "the dog" does not.

use crate::collections::unique_by;
use crate::terms::ApprovedTerm;

/// A shared word must be strictly longer than this to count as overlap.
pub const MIN_SHARED_WORD_LEN: usize = 3;

/// One side of an overlap comparison: absent, a single term, or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Terms(Option<Vec<String>>);

impl Terms {
    /// An absent side. Never overlaps anything.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_slice(&self) -> Option<&[String]> {
        self.0.as_deref()
    }
}

impl From<&str> for Terms {
    fn from(term: &str) -> Self {
        Self(Some(vec![term.to_string()]))
    }
}

impl From<String> for Terms {
    fn from(term: String) -> Self {
        Self(Some(vec![term]))
    }
}

impl From<&String> for Terms {
    fn from(term: &String) -> Self {
        Self(Some(vec![term.clone()]))
    }
}

impl<T: ToString> From<Vec<T>> for Terms {
    fn from(terms: Vec<T>) -> Self {
        Self(Some(terms.iter().map(ToString::to_string).collect()))
    }
}

impl<T: ToString> From<&Vec<T>> for Terms {
    fn from(terms: &Vec<T>) -> Self {
        Self(Some(terms.iter().map(ToString::to_string).collect()))
    }
}

impl<T: ToString> From<&[T]> for Terms {
    fn from(terms: &[T]) -> Self {
        Self(Some(terms.iter().map(ToString::to_string).collect()))
    }
}

impl<T: ToString, const N: usize> From<[T; N]> for Terms {
    fn from(terms: [T; N]) -> Self {
        Self(Some(terms.iter().map(ToString::to_string).collect()))
    }
}

impl<T: Into<Terms>> From<Option<T>> for Terms {
    fn from(terms: Option<T>) -> Self {
        terms.map(Into::into).unwrap_or_default()
    }
}

/// Check whether any term of `a` refers to the same concept as any term of `b`.
///
/// Absent input on either side never overlaps.
pub fn overlaps(a: impl Into<Terms>, b: impl Into<Terms>, fuzzy: bool) -> bool {
    let (Some(a), Some(b)) = (a.into().0, b.into().0) else {
        return false;
    };

    let b: Vec<String> = b.iter().map(|t| t.to_lowercase()).collect();
    a.iter().any(|x| {
        let x = x.to_lowercase();
        b.iter().any(|y| normalized_terms_match(&x, y, fuzzy))
    })
}

/// Overlap check for structured values using a caller-supplied equality.
pub fn overlaps_by<A, B, F>(a: Option<&[A]>, b: Option<&[B]>, eq: F) -> bool
where
    F: Fn(&A, &B) -> bool,
{
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    a.iter().any(|x| b.iter().any(|y| eq(x, y)))
}

/// Compare two individual terms (case-insensitive).
pub fn terms_match(a: &str, b: &str, fuzzy: bool) -> bool {
    normalized_terms_match(&a.to_lowercase(), &b.to_lowercase(), fuzzy)
}

fn normalized_terms_match(a: &str, b: &str, fuzzy: bool) -> bool {
    if a == b {
        return true;
    }
    if !fuzzy {
        return false;
    }

    if a.contains(b) || b.contains(a) {
        return true;
    }

    // Short shared words ("the", "of", "cat") are too common to mean anything
    a.split_whitespace().any(|word| {
        word.chars().count() > MIN_SHARED_WORD_LEN && b.split_whitespace().any(|other| other == word)
    })
}

/// Synonym groups built from approved review terms.
///
/// Each group holds a canonical term followed by its synonyms, lower-cased.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    groups: Vec<Vec<String>>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_approved(terms: &[ApprovedTerm]) -> Self {
        let mut table = Self::new();
        for term in terms {
            table.add_group(&term.term, &term.synonyms);
        }
        table
    }

    pub fn add_group(&mut self, canonical: &str, synonyms: &[String]) {
        let group = unique_by(
            std::iter::once(canonical)
                .chain(synonyms.iter().map(String::as_str))
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            Clone::clone,
        );
        if !group.is_empty() {
            self.groups.push(group);
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Expand `terms` with every group containing one of them.
    ///
    /// Original terms come first, followed by the added synonyms, without
    /// duplicates.
    pub fn expand(&self, terms: &[String]) -> Vec<String> {
        let lowered: Vec<String> = terms.iter().map(|t| t.trim().to_lowercase()).collect();
        let added = self
            .groups
            .iter()
            .filter(|group| group.iter().any(|g| lowered.contains(g)))
            .flat_map(|group| group.iter().cloned());

        unique_by(lowered.iter().cloned().chain(added), Clone::clone)
    }
}

/// Overlap check with patient terms expanded through `synonyms` first.
pub fn overlaps_with_synonyms(
    patient: &[String],
    criterion: &[String],
    fuzzy: bool,
    synonyms: &SynonymTable,
) -> bool {
    overlaps(synonyms.expand(patient), criterion, fuzzy)
}
