//! Recheck Escalator: targeted re-adjudication of unsettled tuples
//!
//! Runs after the reviews are collected and before the arbiter votes.
//!
//! ```text
//! FORMAT_INCOMPLETE       FLIP/MERGE missing its new value or its targets
//! GRANULARITY_UNRESOLVED  granularity conflict and no majority vote
//!          │
//!          ▼
//! group = first relevant conflict record (or the tuple alone)
//!          │
//!   ledger has group? ── yes ──▶ skip
//!          │ no
//!          ▼
//! one request → one action → ARB resolution for the whole group
//! ```
//!
//! The ledger lives as long as the escalator, which the engine creates per
//! run. Repeated calls never issue a second request for the same group.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::adjudicator::{
    request_structured, AdjudicationError, AdjudicationRequest, AdjudicationTask, Adjudicator,
};
use crate::arbiter::VoteTally;
use crate::candidate::{CandidateTuple, TupleId};
use crate::collector::ReviewBundle;
use crate::conflict::ConflictRecord;
use crate::prompts;
use crate::review::{ActionType, Actor, ProposedAction, ReviewAction};

/// Why a tuple was escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecheckTrigger {
    FormatIncomplete,
    GranularityUnresolved,
}

impl std::fmt::Display for RecheckTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FormatIncomplete => write!(f, "FORMAT_INCOMPLETE"),
            Self::GranularityUnresolved => write!(f, "GRANULARITY_UNRESOLVED"),
        }
    }
}

/// Expected recheck answer: a single action, or nothing.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RecheckOutput {
    #[serde(default)]
    pub action: Option<ProposedAction>,
}

/// Arbiter-stamped answer covering one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecheckResolution {
    pub trigger: RecheckTrigger,
    /// Every tuple sent to the recheck
    pub group: Vec<TupleId>,
    /// Tuples this resolution decides (group minus earlier resolutions)
    pub targets: Vec<TupleId>,
    pub action: ReviewAction,
}

/// What happened to one escalated group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecheckOutcome {
    Resolved,
    /// No action returned (or the mock backend degraded)
    EmptyAnswer,
    /// FLIP without a usable polarity
    IncompleteAnswer,
}

/// Audit entry for one escalation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecheckRecord {
    pub trigger: RecheckTrigger,
    pub group_key: String,
    pub outcome: RecheckOutcome,
    pub action_type: Option<ActionType>,
}

/// Group keys already escalated in this run.
#[derive(Debug, Clone, Default)]
pub struct RecheckLedger {
    groups: HashSet<String>,
}

impl RecheckLedger {
    /// Record a group; false if it was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        self.groups.insert(key.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.groups.contains(key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Sorted, comma-joined tuple ids.
pub fn group_key(group: &[TupleId]) -> String {
    let mut ids: Vec<&str> = group.iter().map(TupleId::as_str).collect();
    ids.sort_unstable();
    ids.dedup();
    ids.join(",")
}

/// Tuples needing a recheck, in candidate order, first trigger wins.
pub fn find_triggers(
    candidates: &[CandidateTuple],
    conflicts: &[ConflictRecord],
    reviews: &ReviewBundle,
) -> Vec<(TupleId, RecheckTrigger)> {
    let incomplete: Vec<&ReviewAction> = reviews
        .all()
        .filter(|a| matches!(a.action_type, ActionType::Flip | ActionType::Merge))
        .filter(|a| a.is_incomplete())
        .collect();

    candidates
        .iter()
        .filter_map(|candidate| {
            let tuple_id = &candidate.tuple_id;
            let in_conflict = conflicts.iter().any(|c| c.involves(tuple_id));

            let format_incomplete = incomplete.iter().any(|action| {
                if action.target_tuple_ids.is_empty() {
                    in_conflict
                } else {
                    action.targets(tuple_id)
                }
            });
            if format_incomplete {
                return Some((tuple_id.clone(), RecheckTrigger::FormatIncomplete));
            }

            let granular = conflicts
                .iter()
                .any(|c| c.conflict_type.is_granularity() && c.involves(tuple_id));
            if granular && VoteTally::build(tuple_id, reviews).majority().is_none() {
                return Some((tuple_id.clone(), RecheckTrigger::GranularityUnresolved));
            }
            None
        })
        .collect()
}

/// Tuples escalated together with `tuple_id`.
pub fn recheck_group(
    tuple_id: &TupleId,
    trigger: RecheckTrigger,
    conflicts: &[ConflictRecord],
) -> Vec<TupleId> {
    let record = conflicts.iter().find(|c| {
        c.involves(tuple_id)
            && (trigger != RecheckTrigger::GranularityUnresolved || c.conflict_type.is_granularity())
    });
    match record {
        Some(record) => record.tuple_ids.clone(),
        None => vec![tuple_id.clone()],
    }
}

/// Issues at most one recheck per group and collects the resolutions.
pub struct RecheckEscalator<'a> {
    adjudicator: &'a dyn Adjudicator,
    max_attempts: u32,
    ledger: RecheckLedger,
    resolutions: Vec<RecheckResolution>,
    log: Vec<RecheckRecord>,
}

impl<'a> RecheckEscalator<'a> {
    pub fn new(adjudicator: &'a dyn Adjudicator, max_attempts: u32) -> Self {
        Self {
            adjudicator,
            max_attempts,
            ledger: RecheckLedger::default(),
            resolutions: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &RecheckLedger {
        &self.ledger
    }

    pub fn resolutions(&self) -> &[RecheckResolution] {
        &self.resolutions
    }

    pub fn log(&self) -> &[RecheckRecord] {
        &self.log
    }

    pub fn into_parts(self) -> (Vec<RecheckResolution>, Vec<RecheckRecord>) {
        (self.resolutions, self.log)
    }

    fn is_resolved(&self, tuple_id: &TupleId) -> bool {
        self.resolutions.iter().any(|r| r.targets.contains(tuple_id))
    }

    fn build_request(
        &self,
        trigger: RecheckTrigger,
        group: &[TupleId],
        key: &str,
        candidates: &[CandidateTuple],
        reviews: &ReviewBundle,
    ) -> AdjudicationRequest {
        let members: Vec<&CandidateTuple> = candidates
            .iter()
            .filter(|c| group.contains(&c.tuple_id))
            .collect();
        let prior_votes: Vec<VoteTally> = group
            .iter()
            .map(|tuple_id| VoteTally::build(tuple_id, reviews))
            .collect();

        AdjudicationRequest::for_output::<RecheckOutput>(
            AdjudicationTask::Recheck {
                group: key.to_string(),
            },
            prompts::recheck_instructions(&trigger.to_string()),
            json!({
                "trigger": trigger,
                "candidates": members,
                "prior_votes": prior_votes,
            }),
        )
    }

    /// Escalate every triggered, unresolved tuple. Fatal errors propagate.
    pub async fn escalate(
        &mut self,
        candidates: &[CandidateTuple],
        conflicts: &[ConflictRecord],
        reviews: &ReviewBundle,
    ) -> Result<&[RecheckResolution], AdjudicationError> {
        for (tuple_id, trigger) in find_triggers(candidates, conflicts, reviews) {
            if self.is_resolved(&tuple_id) {
                continue;
            }
            let group = recheck_group(&tuple_id, trigger, conflicts);
            let key = group_key(&group);
            if !self.ledger.insert(&key) {
                debug!(group = %key, "Group already escalated");
                continue;
            }

            let request = self.build_request(trigger, &group, &key, candidates, reviews);
            let output: RecheckOutput =
                request_structured(self.adjudicator, &request, self.max_attempts).await?;

            let outcome = self.record_answer(trigger, &group, output.action);
            info!(
                trigger = %trigger,
                group = %key,
                outcome = ?outcome,
                "Recheck finished"
            );
            let action_type = match outcome {
                RecheckOutcome::Resolved => self.resolutions.last().map(|r| r.action.action_type),
                _ => None,
            };
            self.log.push(RecheckRecord {
                trigger,
                group_key: key,
                outcome,
                action_type,
            });
        }
        Ok(&self.resolutions)
    }

    fn record_answer(
        &mut self,
        trigger: RecheckTrigger,
        group: &[TupleId],
        proposed: Option<ProposedAction>,
    ) -> RecheckOutcome {
        let Some(proposed) = proposed else {
            return RecheckOutcome::EmptyAnswer;
        };

        let mut action = proposed.attribute(Actor::Arbiter);
        if action.action_type == ActionType::Merge {
            debug!("Downgrading recheck MERGE to KEEP");
            action.action_type = ActionType::Keep;
            action.new_value = None;
        }
        if action.action_type == ActionType::Flip && action.new_polarity().is_none() {
            warn!(trigger = %trigger, "Recheck FLIP without polarity, group left unresolved");
            return RecheckOutcome::IncompleteAnswer;
        }

        let targets: Vec<TupleId> = group
            .iter()
            .filter(|id| !self.is_resolved(id))
            .cloned()
            .collect();
        action.target_tuple_ids = targets.clone();
        self.resolutions.push(RecheckResolution {
            trigger,
            group: group.to_vec(),
            targets,
            action,
        });
        RecheckOutcome::Resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjudicator::{BackendKind, ScriptedAdjudicator, ScriptedResponse};
    use crate::candidate::Polarity;
    use crate::conflict::{ConflictId, ConflictType};
    use crate::review::ReasonCode;

    fn candidate(id: &str, reference: &str) -> CandidateTuple {
        CandidateTuple {
            tuple_id: id.into(),
            aspect_term: String::new(),
            aspect_ref: Some(reference.to_string()),
            polarity: Polarity::Positive,
            evidence: None,
            span: None,
            origin_agent: "literal".to_string(),
            confidence: 1.0,
            invalid_ref_flag: false,
            invalid_language_flag: false,
            invalid_target_flag: false,
        }
    }

    fn granularity_fixture() -> (Vec<CandidateTuple>, Vec<ConflictRecord>) {
        let candidates = vec![
            candidate("t0", "제품 전체#일반"),
            candidate("t1", "본품#일반"),
            candidate("t2", "브랜드#인지도"),
        ];
        let conflicts = vec![ConflictRecord {
            conflict_id: ConflictId::from_index(0),
            conflict_type: ConflictType::GranularityOverlapCandidate,
            tuple_ids: vec!["t0".into(), "t1".into()],
            aspect_ref: None,
            aspect_term: None,
        }];
        (candidates, conflicts)
    }

    fn split_votes() -> ReviewBundle {
        let mut reviews = ReviewBundle::default();
        reviews.insert(
            Actor::A,
            vec![ReviewAction::new(Actor::A, ActionType::Drop, ReasonCode::RedundantUpperRef)
                .targeting("t0")],
        );
        reviews.insert(
            Actor::B,
            vec![ReviewAction::new(Actor::B, ActionType::Flag, ReasonCode::Other).targeting("t0")],
        );
        reviews
    }

    #[test]
    fn test_group_key_is_sorted() {
        let group: Vec<TupleId> = vec!["t3".into(), "t1".into(), "t3".into()];
        assert_eq!(group_key(&group), "t1,t3");
    }

    #[test]
    fn test_granularity_without_majority_triggers() {
        let (candidates, conflicts) = granularity_fixture();
        let triggers = find_triggers(&candidates, &conflicts, &split_votes());
        assert_eq!(
            triggers,
            vec![(TupleId::from("t0"), RecheckTrigger::GranularityUnresolved)]
        );
    }

    #[test]
    fn test_flip_without_targets_marks_conflicted_tuples() {
        let (candidates, conflicts) = granularity_fixture();
        let mut reviews = ReviewBundle::default();
        reviews.insert(
            Actor::B,
            vec![ReviewAction::new(Actor::B, ActionType::Flip, ReasonCode::NegationScope)
                .with_new_value("negative")],
        );
        let triggers = find_triggers(&candidates, &conflicts, &reviews);
        let ids: Vec<&str> = triggers.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1"]);
        assert!(triggers
            .iter()
            .all(|(_, t)| *t == RecheckTrigger::FormatIncomplete));
    }

    #[test]
    fn test_merge_without_reference_triggers() {
        let (candidates, conflicts) = granularity_fixture();
        let mut reviews = ReviewBundle::default();
        reviews.insert(
            Actor::A,
            vec![ReviewAction::new(Actor::A, ActionType::Merge, ReasonCode::RefNormalization)
                .targeting("t2")],
        );
        let triggers = find_triggers(&candidates, &conflicts, &reviews);
        assert_eq!(
            triggers,
            vec![(TupleId::from("t2"), RecheckTrigger::FormatIncomplete)]
        );
        assert_eq!(
            recheck_group(&"t2".into(), RecheckTrigger::FormatIncomplete, &conflicts),
            vec![TupleId::from("t2")]
        );
    }

    #[tokio::test]
    async fn test_escalates_group_once_and_stamps_arbiter() {
        let (candidates, conflicts) = granularity_fixture();
        let reviews = split_votes();
        let scripted = ScriptedAdjudicator::new().respond(
            "recheck:t0,t1",
            json!({"action": {"action_type": "DROP", "target_tuple_ids": ["t0"], "reason_code": "REDUNDANT_UPPER_REF"}}),
        );
        let mut escalator = RecheckEscalator::new(&scripted, 1);

        let resolutions = escalator
            .escalate(&candidates, &conflicts, &reviews)
            .await
            .unwrap();
        assert_eq!(resolutions.len(), 1);
        let resolution = &resolutions[0];
        assert_eq!(resolution.action.actor, Actor::Arbiter);
        assert_eq!(resolution.action.action_type, ActionType::Drop);
        assert_eq!(resolution.targets, vec![TupleId::from("t0"), TupleId::from("t1")]);

        escalator
            .escalate(&candidates, &conflicts, &reviews)
            .await
            .unwrap();
        assert_eq!(scripted.call_count("recheck"), 1);
        assert_eq!(escalator.log().len(), 1);
        assert_eq!(escalator.log()[0].outcome, RecheckOutcome::Resolved);
        assert!(escalator.ledger().contains("t0,t1"));
    }

    #[tokio::test]
    async fn test_unresolved_group_is_not_retried() {
        let (candidates, conflicts) = granularity_fixture();
        let reviews = split_votes();
        let scripted = ScriptedAdjudicator::new().respond("recheck", json!({}));
        let mut escalator = RecheckEscalator::new(&scripted, 1);

        for _ in 0..2 {
            let resolutions = escalator
                .escalate(&candidates, &conflicts, &reviews)
                .await
                .unwrap();
            assert!(resolutions.is_empty());
        }
        assert_eq!(scripted.call_count("recheck"), 1);
        assert_eq!(escalator.log()[0].outcome, RecheckOutcome::EmptyAnswer);
    }

    #[tokio::test]
    async fn test_merge_answer_is_downgraded_to_keep() {
        let (candidates, conflicts) = granularity_fixture();
        let scripted = ScriptedAdjudicator::new().respond(
            "recheck",
            json!({"action": {"action_type": "MERGE", "new_value": "본품#일반", "reason_code": "REF_NORMALIZATION"}}),
        );
        let mut escalator = RecheckEscalator::new(&scripted, 1);
        let resolutions = escalator
            .escalate(&candidates, &conflicts, &split_votes())
            .await
            .unwrap();
        assert_eq!(resolutions[0].action.action_type, ActionType::Keep);
        assert_eq!(resolutions[0].action.new_value, None);
    }

    #[tokio::test]
    async fn test_flip_answer_without_polarity_stays_unresolved() {
        let (candidates, conflicts) = granularity_fixture();
        let scripted = ScriptedAdjudicator::new().respond(
            "recheck",
            json!({"action": {"action_type": "FLIP", "reason_code": "NEGATION_SCOPE"}}),
        );
        let mut escalator = RecheckEscalator::new(&scripted, 1);
        let resolutions = escalator
            .escalate(&candidates, &conflicts, &split_votes())
            .await
            .unwrap();
        assert!(resolutions.is_empty());
        assert_eq!(escalator.log()[0].outcome, RecheckOutcome::IncompleteAnswer);
    }

    #[tokio::test]
    async fn test_fatal_recheck_error_propagates() {
        let (candidates, conflicts) = granularity_fixture();
        let scripted = ScriptedAdjudicator::new().with_backend(BackendKind::Production);
        scripted.push("recheck", ScriptedResponse::Fatal("quota".to_string()));
        let mut escalator = RecheckEscalator::new(&scripted, 3);
        let err = escalator
            .escalate(&candidates, &conflicts, &split_votes())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_request_carries_prior_votes() {
        let (candidates, _) = granularity_fixture();
        let scripted = ScriptedAdjudicator::new();
        let escalator = RecheckEscalator::new(&scripted, 1);
        let group: Vec<TupleId> = vec!["t0".into(), "t1".into()];
        let request = escalator.build_request(
            RecheckTrigger::GranularityUnresolved,
            &group,
            "t0,t1",
            &candidates,
            &split_votes(),
        );
        assert_eq!(request.task.key(), "recheck:t0,t1");
        assert_eq!(request.context["candidates"].as_array().unwrap().len(), 2);
        assert_eq!(request.context["prior_votes"][0]["votes"][0]["action"], "DROP");
        // C never reviewed t0: implicit KEEP.
        assert_eq!(request.context["prior_votes"][0]["votes"][2]["action"], "KEEP");
        assert_eq!(request.context["trigger"], "GRANULARITY_UNRESOLVED");
    }
}
