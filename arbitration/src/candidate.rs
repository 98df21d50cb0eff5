//! Candidate tuples, the shared representation every stage works on.
//!
//! A candidate is one proposed (aspect term, aspect reference, polarity)
//! assertion produced by a perspective agent. Candidates are created once by
//! the merger and afterwards only touched by the applier.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Stable identifier assigned to a candidate at merge time.
///
/// This is the only join key between candidates, conflict records,
/// review actions and arbiter decisions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TupleId(String);

impl TupleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id for the n-th candidate of a run.
    pub fn from_index(index: usize) -> Self {
        Self(format!("t{}", index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TupleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TupleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Sentiment polarity of a candidate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

impl Polarity {
    /// Whether the two polarities point in opposite directions.
    pub fn is_opposite(self, other: Polarity) -> bool {
        matches!(
            (self, other),
            (Self::Positive, Self::Negative) | (Self::Negative, Self::Positive)
        )
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Negative => write!(f, "negative"),
            Self::Neutral => write!(f, "neutral"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Error for polarity strings outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown polarity: {0}")]
pub struct UnknownPolarity(pub String);

impl FromStr for Polarity {
    type Err = UnknownPolarity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Ok(Self::Positive),
            "negative" | "neg" => Ok(Self::Negative),
            "neutral" | "neu" => Ok(Self::Neutral),
            "mixed" => Ok(Self::Mixed),
            other => Err(UnknownPolarity(other.to_string())),
        }
    }
}

/// Character offsets of the evidence inside the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// One merged candidate tuple with its validity diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTuple {
    pub tuple_id: TupleId,
    /// Surface term; empty for implicit aspects
    pub aspect_term: String,
    /// Closed-vocabulary `entity#attribute` reference
    pub aspect_ref: Option<String>,
    pub polarity: Polarity,
    pub evidence: Option<String>,
    pub span: Option<Span>,
    /// Perspective label of the agent that produced this tuple
    pub origin_agent: String,
    /// Agent confidence after validity-flag discounts
    pub confidence: f64,
    pub invalid_ref_flag: bool,
    pub invalid_language_flag: bool,
    pub invalid_target_flag: bool,
}

impl CandidateTuple {
    /// Number of validity flags raised on this tuple.
    pub fn flag_count(&self) -> usize {
        [
            self.invalid_ref_flag,
            self.invalid_language_flag,
            self.invalid_target_flag,
        ]
        .iter()
        .filter(|f| **f)
        .count()
    }

    /// Reference with surrounding whitespace removed, if any is set.
    pub fn reference(&self) -> Option<&str> {
        self.aspect_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}
