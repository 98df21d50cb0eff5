//! Conflict detection over merged candidate sets
//!
//! Conflicts are explicit records, not errors. Each record names the tuples
//! involved; downstream stages join on tuple ids only, so the reference and
//! term carried here are for display.
//!
//! # Conflict classes
//!
//! ```text
//! ref_polarity_mismatch          same aspect_ref, ≥2 polarities
//! term_polarity_mismatch         no aspect_ref, same surface term, ≥2 polarities
//! semantic_conflict_candidate    inside a ref mismatch: similar but distinct
//!                                terms with opposite polarity (feature flag)
//! granularity_overlap_candidate  same (attribute, polarity) at an upper entity
//!                                and a non-upper entity
//! ```

pub mod detector;
pub mod similarity;

pub use detector::ConflictDetector;
pub use similarity::{edit_ratio, ngram_jaccard, normalize_term, SimilarityParams};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::candidate::TupleId;

/// Kind of detected disagreement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    RefPolarityMismatch,
    TermPolarityMismatch,
    SemanticConflictCandidate,
    GranularityOverlapCandidate,
}

impl ConflictType {
    pub const ALL: [ConflictType; 4] = [
        Self::RefPolarityMismatch,
        Self::TermPolarityMismatch,
        Self::SemanticConflictCandidate,
        Self::GranularityOverlapCandidate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RefPolarityMismatch => "ref_polarity_mismatch",
            Self::TermPolarityMismatch => "term_polarity_mismatch",
            Self::SemanticConflictCandidate => "semantic_conflict_candidate",
            Self::GranularityOverlapCandidate => "granularity_overlap_candidate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name.trim())
    }

    pub fn is_granularity(self) -> bool {
        matches!(self, Self::GranularityOverlapCandidate)
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit identifier of a conflict record within one run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ConflictId(String);

impl ConflictId {
    pub fn from_index(index: usize) -> Self {
        Self(format!("c{}", index))
    }
}

impl std::fmt::Display for ConflictId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One detected disagreement between candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConflictRecord {
    pub conflict_id: ConflictId,
    pub conflict_type: ConflictType,
    pub tuple_ids: Vec<TupleId>,
    /// Display only
    pub aspect_ref: Option<String>,
    /// Display only
    pub aspect_term: Option<String>,
}

impl ConflictRecord {
    pub fn involves(&self, tuple_id: &TupleId) -> bool {
        self.tuple_ids.contains(tuple_id)
    }
}

/// Conflict types a tuple participates in.
pub fn conflict_types_of<'a>(
    conflicts: &'a [ConflictRecord],
    tuple_id: &'a TupleId,
) -> impl Iterator<Item = ConflictType> + 'a {
    conflicts
        .iter()
        .filter(move |c| c.involves(tuple_id))
        .map(|c| c.conflict_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_type_names_round_trip() {
        for conflict_type in ConflictType::ALL {
            assert_eq!(ConflictType::from_name(conflict_type.as_str()), Some(conflict_type));
            let json = serde_json::to_string(&conflict_type).unwrap();
            assert_eq!(json, format!("\"{}\"", conflict_type.as_str()));
        }
        assert_eq!(ConflictType::from_name("unknown"), None);
    }

    #[test]
    fn test_conflict_types_of_tuple() {
        let conflicts = vec![
            ConflictRecord {
                conflict_id: ConflictId::from_index(0),
                conflict_type: ConflictType::RefPolarityMismatch,
                tuple_ids: vec!["t0".into(), "t1".into()],
                aspect_ref: Some("본품#품질".to_string()),
                aspect_term: None,
            },
            ConflictRecord {
                conflict_id: ConflictId::from_index(1),
                conflict_type: ConflictType::GranularityOverlapCandidate,
                tuple_ids: vec!["t1".into(), "t2".into()],
                aspect_ref: Some("품질".to_string()),
                aspect_term: None,
            },
        ];
        let t1 = TupleId::from("t1");
        let types: Vec<_> = conflict_types_of(&conflicts, &t1).collect();
        assert_eq!(
            types,
            vec![
                ConflictType::RefPolarityMismatch,
                ConflictType::GranularityOverlapCandidate
            ]
        );
    }
}
