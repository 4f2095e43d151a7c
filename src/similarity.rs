//! Classification of perceptual-hash similarity scores returned by the
//! verification endpoint.

use std::fmt;

/// Scores at or above this value are treated as the same content
pub const DUPLICATE_THRESHOLD: f64 = 0.95;

/// Scores at or above this value, and below [`DUPLICATE_THRESHOLD`], are
/// treated as an edited copy
pub const MODIFIED_THRESHOLD: f64 = 0.80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Duplicate,
    Modified,
    Distinct,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchStatus::Duplicate => "duplicate",
            MatchStatus::Modified => "modified",
            MatchStatus::Distinct => "distinct",
        };
        f.write_str(s)
    }
}

/// Classifies a similarity score in `[0, 1]`.
///
/// Scores that are not a number are `Distinct`.
pub fn classify(similarity: f64) -> MatchStatus {
    if similarity >= DUPLICATE_THRESHOLD {
        MatchStatus::Duplicate
    } else if similarity >= MODIFIED_THRESHOLD {
        MatchStatus::Modified
    } else {
        MatchStatus::Distinct
    }
}
