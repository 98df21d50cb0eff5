//! Review actions over candidate tuples
//!
//! Reviewers answer with [`ProposedAction`]s; the collector stamps the actor
//! and turns them into [`ReviewAction`]s. Missing actions are implicit KEEP
//! votes, which the arbiter materializes when it builds a tally.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::candidate::{Polarity, TupleId};

/// Disposition a reviewer (or the arbiter) proposes for a tuple.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Keep,
    Drop,
    Flip,
    Merge,
    Flag,
}

impl ActionType {
    /// Vote used for majority counting. MERGE counts as KEEP.
    pub fn normalized(self) -> Self {
        match self {
            Self::Merge => Self::Keep,
            other => other,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keep => write!(f, "KEEP"),
            Self::Drop => write!(f, "DROP"),
            Self::Flip => write!(f, "FLIP"),
            Self::Merge => write!(f, "MERGE"),
            Self::Flag => write!(f, "FLAG"),
        }
    }
}

/// Closed vocabulary of reasons attached to actions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NegationScope,
    ContrastClause,
    StructuralInconsistent,
    WeakEvidence,
    RedundantUpperRef,
    FacetMinoritySignal,
    RedundantRefUncertain,
    TieUnresolved,
    PolarityUncertain,
    FormatIncomplete,
    EvidenceSupported,
    ImplicitAspect,
    DuplicateTuple,
    InvalidTarget,
    RefNormalization,
    #[serde(other)]
    Other,
}

impl ReasonCode {
    /// Reasons that justify adopting a lone FLIP vote.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            Self::NegationScope | Self::ContrastClause | Self::StructuralInconsistent
        )
    }

    /// Reasons that justify adopting a lone DROP vote.
    pub fn is_justified_drop(self) -> bool {
        matches!(self, Self::WeakEvidence | Self::RedundantUpperRef)
    }
}

impl ReasonCode {
    pub const ALL: [ReasonCode; 16] = [
        Self::NegationScope,
        Self::ContrastClause,
        Self::StructuralInconsistent,
        Self::WeakEvidence,
        Self::RedundantUpperRef,
        Self::FacetMinoritySignal,
        Self::RedundantRefUncertain,
        Self::TieUnresolved,
        Self::PolarityUncertain,
        Self::FormatIncomplete,
        Self::EvidenceSupported,
        Self::ImplicitAspect,
        Self::DuplicateTuple,
        Self::InvalidTarget,
        Self::RefNormalization,
        Self::Other,
    ];

    /// Look up a code by its canonical spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.as_str() == name.trim())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NegationScope => "NEGATION_SCOPE",
            Self::ContrastClause => "CONTRAST_CLAUSE",
            Self::StructuralInconsistent => "STRUCTURAL_INCONSISTENT",
            Self::WeakEvidence => "WEAK_EVIDENCE",
            Self::RedundantUpperRef => "REDUNDANT_UPPER_REF",
            Self::FacetMinoritySignal => "FACET_MINORITY_SIGNAL",
            Self::RedundantRefUncertain => "REDUNDANT_REF_UNCERTAIN",
            Self::TieUnresolved => "TIE_UNRESOLVED",
            Self::PolarityUncertain => "POLARITY_UNCERTAIN",
            Self::FormatIncomplete => "FORMAT_INCOMPLETE",
            Self::EvidenceSupported => "EVIDENCE_SUPPORTED",
            Self::ImplicitAspect => "IMPLICIT_ASPECT",
            Self::DuplicateTuple => "DUPLICATE_TUPLE",
            Self::InvalidTarget => "INVALID_TARGET",
            Self::RefNormalization => "REF_NORMALIZATION",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who produced an action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Actor {
    A,
    B,
    C,
    #[serde(rename = "ARB")]
    Arbiter,
}

impl Actor {
    /// The three independent reviewer roles, in tally order.
    pub const REVIEWERS: [Actor; 3] = [Actor::A, Actor::B, Actor::C];

    pub fn is_reviewer(self) -> bool {
        !matches!(self, Self::Arbiter)
    }

    /// Short description of what the reviewer role looks at.
    pub fn focus(self) -> &'static str {
        match self {
            Self::A => "sentence structure: negation scope, contrast clauses, polarity consistency",
            Self::B => "evidence: whether each tuple is grounded in the quoted text",
            Self::C => "reference granularity: entity level and redundant upper references",
            Self::Arbiter => "final adjudication of unresolved conflict groups",
        }
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::Arbiter => write!(f, "ARB"),
        }
    }
}

/// Action as returned by a reviewer, before attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProposedAction {
    pub action_type: ActionType,
    #[serde(default)]
    pub target_tuple_ids: Vec<TupleId>,
    /// New polarity for FLIP, normalized reference for MERGE
    #[serde(default)]
    pub new_value: Option<String>,
    pub reason_code: ReasonCode,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl ProposedAction {
    pub fn attribute(self, actor: Actor) -> ReviewAction {
        ReviewAction {
            action_type: self.action_type,
            target_tuple_ids: self.target_tuple_ids,
            new_value: self.new_value,
            reason_code: self.reason_code,
            actor,
            rationale: self.rationale,
        }
    }
}

/// One attributed disposition for one or more tuples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAction {
    pub action_type: ActionType,
    pub target_tuple_ids: Vec<TupleId>,
    pub new_value: Option<String>,
    pub reason_code: ReasonCode,
    pub actor: Actor,
    pub rationale: Option<String>,
}

impl ReviewAction {
    pub fn new(actor: Actor, action_type: ActionType, reason_code: ReasonCode) -> Self {
        Self {
            action_type,
            target_tuple_ids: Vec::new(),
            new_value: None,
            reason_code,
            actor,
            rationale: None,
        }
    }

    pub fn targeting(mut self, tuple_id: impl Into<TupleId>) -> Self {
        self.target_tuple_ids.push(tuple_id.into());
        self
    }

    pub fn with_new_value(mut self, value: impl Into<String>) -> Self {
        self.new_value = Some(value.into());
        self
    }

    pub fn targets(&self, tuple_id: &TupleId) -> bool {
        self.target_tuple_ids.contains(tuple_id)
    }

    /// Polarity carried by a FLIP, if present and parseable.
    pub fn new_polarity(&self) -> Option<Polarity> {
        self.new_value.as_deref().and_then(|v| v.parse().ok())
    }

    /// Normalized reference carried by a MERGE, if present.
    pub fn merge_reference(&self) -> Option<&str> {
        self.new_value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Whether a FLIP/MERGE lacks a field it requires.
    ///
    /// KEEP, DROP and FLAG never count as incomplete.
    pub fn is_incomplete(&self) -> bool {
        match self.action_type {
            ActionType::Flip => self.target_tuple_ids.is_empty() || self.new_polarity().is_none(),
            ActionType::Merge => {
                self.target_tuple_ids.is_empty() || self.merge_reference().is_none()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_normalizes_to_keep() {
        assert_eq!(ActionType::Merge.normalized(), ActionType::Keep);
        assert_eq!(ActionType::Flip.normalized(), ActionType::Flip);
    }

    #[test]
    fn test_unknown_reason_code_deserializes_to_other() {
        let reason: ReasonCode = serde_json::from_str("\"SARCASM\"").unwrap();
        assert_eq!(reason, ReasonCode::Other);
        let reason: ReasonCode = serde_json::from_str("\"NEGATION_SCOPE\"").unwrap();
        assert_eq!(reason, ReasonCode::NegationScope);
        assert_eq!(ReasonCode::WeakEvidence.to_string(), "WEAK_EVIDENCE");
    }

    #[test]
    fn test_arbiter_actor_serializes_as_arb() {
        assert_eq!(serde_json::to_string(&Actor::Arbiter).unwrap(), "\"ARB\"");
        assert_eq!(Actor::Arbiter.to_string(), "ARB");
    }

    #[test]
    fn test_incomplete_flip_and_merge() {
        let flip = ReviewAction::new(Actor::A, ActionType::Flip, ReasonCode::NegationScope)
            .targeting("t0");
        assert!(flip.is_incomplete());
        assert!(!flip.clone().with_new_value("negative").is_incomplete());
        assert!(flip.with_new_value("very bad").is_incomplete());

        let merge = ReviewAction::new(Actor::C, ActionType::Merge, ReasonCode::RefNormalization)
            .with_new_value("본품#일반");
        assert!(merge.is_incomplete(), "empty targets are incomplete");

        let drop = ReviewAction::new(Actor::B, ActionType::Drop, ReasonCode::WeakEvidence);
        assert!(!drop.is_incomplete());
    }

    #[test]
    fn test_proposed_action_parses_with_defaults() {
        let json = r#"{"action_type":"DROP","reason_code":"WEAK_EVIDENCE","target_tuple_ids":["t1"]}"#;
        let proposed: ProposedAction = serde_json::from_str(json).unwrap();
        let action = proposed.attribute(Actor::B);
        assert_eq!(action.actor, Actor::B);
        assert!(action.targets(&TupleId::from("t1")));
        assert!(action.new_value.is_none());
    }
}
