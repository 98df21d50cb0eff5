//! One final action per candidate, computed without collaborator calls.
//!
//! Consumes the three reviewers' actions, the conflict records and any
//! recheck resolutions, and computes a single decision per tuple. No
//! collaborator calls happen here; the same inputs always produce the same
//! decisions.
//!
//! # Rules (in precedence order)
//!
//! ```text
//! escalated group            → recheck answer, emitted once per group
//! ≥2 identical votes         → majority
//!   └─ priority facet dissents → FLAG FACET_MINORITY_SIGNAL
//! {FLIP, DROP, KEEP}         → FLIP if structural reason
//!                            → DROP if justified reason
//!                            → FLAG REDUNDANT_REF_UNCERTAIN | TIE_UNRESOLVED
//! any other split            → FLAG REDUNDANT_REF_UNCERTAIN | POLARITY_UNCERTAIN
//! ```
//!
//! MERGE votes count as KEEP and the arbiter never emits MERGE.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candidate::{CandidateTuple, TupleId};
use crate::collector::ReviewBundle;
use crate::config::PriorityFacets;
use crate::conflict::{conflict_types_of, ConflictRecord, ConflictType};
use crate::recheck::RecheckResolution;
use crate::review::{ActionType, Actor, ReasonCode, ReviewAction};

/// One reviewer's vote on one tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub actor: Actor,
    /// Normalized action used for counting
    pub action: ActionType,
    /// The reviewer's action; `None` is an implicit KEEP
    pub source: Option<ReviewAction>,
}

impl Vote {
    pub fn implicit_keep(actor: Actor) -> Self {
        Self {
            actor,
            action: ActionType::Keep,
            source: None,
        }
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        self.source.as_ref().map(|a| a.reason_code)
    }

    pub fn is_implicit(&self) -> bool {
        self.source.is_none()
    }
}

/// The three votes on a single tuple, in A, B, C order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub tuple_id: TupleId,
    pub votes: Vec<Vote>,
}

impl VoteTally {
    /// Build the tally. A reviewer without an action on the tuple votes KEEP;
    /// a reviewer with several actions on it is represented by the first.
    pub fn build(tuple_id: &TupleId, reviews: &ReviewBundle) -> Self {
        let votes = Actor::REVIEWERS
            .into_iter()
            .map(|actor| {
                match reviews.actions(actor).iter().find(|a| a.targets(tuple_id)) {
                    Some(action) => Vote {
                        actor,
                        action: action.action_type.normalized(),
                        source: Some(action.clone()),
                    },
                    None => Vote::implicit_keep(actor),
                }
            })
            .collect();
        Self {
            tuple_id: tuple_id.clone(),
            votes,
        }
    }

    fn count(&self, action: ActionType) -> usize {
        self.votes.iter().filter(|v| v.action == action).count()
    }

    /// Action with at least two votes, if any.
    pub fn majority(&self) -> Option<ActionType> {
        self.votes
            .iter()
            .map(|v| v.action)
            .find(|action| self.count(*action) >= 2)
    }

    /// Votes that differ from the given majority.
    pub fn minority(&self, majority: ActionType) -> impl Iterator<Item = &Vote> {
        self.votes.iter().filter(move |v| v.action != majority)
    }

    /// First vote (A→B→C) for the given action.
    pub fn first_vote(&self, action: ActionType) -> Option<&Vote> {
        self.votes.iter().find(|v| v.action == action)
    }

    /// Exactly one FLIP, one DROP and one KEEP.
    pub fn is_flip_drop_keep(&self) -> bool {
        self.votes.len() == 3
            && [ActionType::Flip, ActionType::Drop, ActionType::Keep]
                .iter()
                .all(|action| self.count(*action) == 1)
    }

    /// New polarity from the first FLIP vote that supplied one.
    pub fn flip_value(&self) -> Option<String> {
        self.votes
            .iter()
            .filter(|v| v.action == ActionType::Flip)
            .find_map(|v| v.source.as_ref().and_then(ReviewAction::new_polarity))
            .map(|p| p.to_string())
    }
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    Majority,
    FacetMinority,
    StructuralFlip,
    JustifiedDrop,
    TieUnresolved,
    Disagreement,
    Escalated,
}

/// Final action for one tuple, or for one escalated group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterDecision {
    pub target_tuple_ids: Vec<TupleId>,
    pub action_type: ActionType,
    pub new_value: Option<String>,
    pub reason_code: Option<ReasonCode>,
    /// Always [`Actor::Arbiter`]
    pub actor: Actor,
    pub rule: DecisionRule,
}

impl ArbiterDecision {
    fn for_tuple(
        tuple_id: &TupleId,
        action_type: ActionType,
        reason_code: Option<ReasonCode>,
        rule: DecisionRule,
    ) -> Self {
        Self {
            target_tuple_ids: vec![tuple_id.clone()],
            action_type,
            new_value: None,
            reason_code,
            actor: Actor::Arbiter,
            rule,
        }
    }

    fn flag(tuple_id: &TupleId, reason: ReasonCode, rule: DecisionRule) -> Self {
        Self::for_tuple(tuple_id, ActionType::Flag, Some(reason), rule)
    }

    fn escalated(resolution: &RecheckResolution) -> Self {
        Self {
            target_tuple_ids: resolution.targets.clone(),
            action_type: resolution.action.action_type,
            new_value: resolution.action.new_value.clone(),
            reason_code: Some(resolution.action.reason_code),
            actor: Actor::Arbiter,
            rule: DecisionRule::Escalated,
        }
    }
}

/// Voting state machine configured with the priority facets.
pub struct DeterministicArbiter<'a> {
    facets: &'a PriorityFacets,
}

impl<'a> DeterministicArbiter<'a> {
    pub fn new(facets: &'a PriorityFacets) -> Self {
        Self { facets }
    }

    /// Decide every candidate. Each tuple id is covered by exactly one
    /// decision; escalated groups produce one decision for all their tuples.
    pub fn decide(
        &self,
        candidates: &[CandidateTuple],
        conflicts: &[ConflictRecord],
        reviews: &ReviewBundle,
        resolutions: &[RecheckResolution],
    ) -> Vec<ArbiterDecision> {
        let mut resolved: HashMap<&TupleId, usize> = HashMap::new();
        for (index, resolution) in resolutions.iter().enumerate() {
            for tuple_id in &resolution.targets {
                resolved.entry(tuple_id).or_insert(index);
            }
        }

        let mut emitted_groups: HashSet<usize> = HashSet::new();
        let mut decisions = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let tuple_id = &candidate.tuple_id;
            if let Some(&index) = resolved.get(tuple_id) {
                if emitted_groups.insert(index) {
                    decisions.push(ArbiterDecision::escalated(&resolutions[index]));
                }
                continue;
            }

            let tally = VoteTally::build(tuple_id, reviews);
            let conflict_types: Vec<ConflictType> =
                conflict_types_of(conflicts, tuple_id).collect();
            let decision = self.decide_tuple(&tally, &conflict_types);
            debug!(
                tuple_id = %tuple_id,
                action = %decision.action_type,
                rule = ?decision.rule,
                "Tuple decided"
            );
            decisions.push(decision);
        }

        info!(
            decisions = decisions.len(),
            escalated = emitted_groups.len(),
            "Arbitration complete"
        );
        decisions
    }

    /// Whether a dissenting reviewer is the trusted facet for this tuple.
    fn facet_dissents(&self, tally: &VoteTally, majority: ActionType, types: &[ConflictType]) -> bool {
        tally.minority(majority).any(|vote| {
            let by_conflict = types
                .iter()
                .any(|t| self.facets.for_conflict(*t) == Some(vote.actor));
            let by_reason = vote
                .reason()
                .is_some_and(|r| self.facets.for_reason(r) == Some(vote.actor));
            by_conflict || by_reason
        })
    }

    /// Apply the voting rules to one tally.
    pub fn decide_tuple(&self, tally: &VoteTally, conflict_types: &[ConflictType]) -> ArbiterDecision {
        let tuple_id = &tally.tuple_id;
        let granularity = conflict_types.iter().any(|t| t.is_granularity());

        if let Some(majority) = tally.majority() {
            if self.facet_dissents(tally, majority, conflict_types) {
                return ArbiterDecision::flag(
                    tuple_id,
                    ReasonCode::FacetMinoritySignal,
                    DecisionRule::FacetMinority,
                );
            }
            let reason = tally.votes.iter().filter(|v| v.action == majority).find_map(Vote::reason);
            let mut decision =
                ArbiterDecision::for_tuple(tuple_id, majority, reason, DecisionRule::Majority);
            if majority == ActionType::Flip {
                decision.new_value = tally.flip_value();
            }
            return decision;
        }

        if tally.is_flip_drop_keep() {
            let flip_reason = tally.first_vote(ActionType::Flip).and_then(Vote::reason);
            let drop_reason = tally.first_vote(ActionType::Drop).and_then(Vote::reason);

            if let Some(reason) = flip_reason.filter(|r| r.is_structural()) {
                let mut decision = ArbiterDecision::for_tuple(
                    tuple_id,
                    ActionType::Flip,
                    Some(reason),
                    DecisionRule::StructuralFlip,
                );
                decision.new_value = tally.flip_value();
                return decision;
            }
            if let Some(reason) = drop_reason.filter(|r| r.is_justified_drop()) {
                return ArbiterDecision::for_tuple(
                    tuple_id,
                    ActionType::Drop,
                    Some(reason),
                    DecisionRule::JustifiedDrop,
                );
            }
            let reason = if granularity {
                ReasonCode::RedundantRefUncertain
            } else {
                ReasonCode::TieUnresolved
            };
            return ArbiterDecision::flag(tuple_id, reason, DecisionRule::TieUnresolved);
        }

        let reason = if granularity {
            ReasonCode::RedundantRefUncertain
        } else {
            ReasonCode::PolarityUncertain
        };
        ArbiterDecision::flag(tuple_id, reason, DecisionRule::Disagreement)
    }
}
