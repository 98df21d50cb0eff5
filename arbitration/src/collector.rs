//! Review Collector: fan-out of one request per reviewer role
//!
//! Reviewers A, B and C receive structurally identical requests and answer
//! independently. Nothing is aggregated here; the collector only builds the
//! requests and attributes the answers to their actor.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::adjudicator::{
    request_structured, AdjudicationError, AdjudicationRequest, AdjudicationTask, Adjudicator,
};
use crate::candidate::{CandidateTuple, TupleId};
use crate::conflict::ConflictRecord;
use crate::prompts;
use crate::review::{Actor, ProposedAction, ReviewAction};

/// Kind of externally annotated structural risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StructuralRiskKind {
    Negation,
    Contrast,
    Irony,
    Hedging,
    #[serde(other)]
    Other,
}

/// Structural-risk annotation supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructuralRisk {
    pub kind: StructuralRiskKind,
    #[serde(default)]
    pub tuple_ids: Vec<TupleId>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Everything a reviewer sees besides the candidates and conflicts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewContext {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub structural_risks: Vec<StructuralRisk>,
    /// Advisory notes carried over from earlier samples
    #[serde(default)]
    pub memory_advisory: Option<String>,
}

/// Expected reviewer answer.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ReviewerOutput {
    #[serde(default)]
    pub actions: Vec<ProposedAction>,
}

/// Attributed actions of all three reviewers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewBundle {
    pub by_actor: BTreeMap<Actor, Vec<ReviewAction>>,
}

impl ReviewBundle {
    pub fn insert(&mut self, actor: Actor, actions: Vec<ReviewAction>) {
        self.by_actor.insert(actor, actions);
    }

    /// Actions of one reviewer; empty when it returned none.
    pub fn actions(&self, actor: Actor) -> &[ReviewAction] {
        self.by_actor.get(&actor).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All actions in reviewer order.
    pub fn all(&self) -> impl Iterator<Item = &ReviewAction> {
        Actor::REVIEWERS
            .into_iter()
            .flat_map(move |actor| self.actions(actor).iter())
    }

    pub fn len(&self) -> usize {
        self.by_actor.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Issues review requests through the adjudication collaborator.
pub struct ReviewCollector<'a> {
    adjudicator: &'a dyn Adjudicator,
    max_attempts: u32,
}

impl<'a> ReviewCollector<'a> {
    pub fn new(adjudicator: &'a dyn Adjudicator, max_attempts: u32) -> Self {
        Self {
            adjudicator,
            max_attempts,
        }
    }

    /// The request reviewer `actor` receives.
    pub fn build_request(
        &self,
        actor: Actor,
        candidates: &[CandidateTuple],
        conflicts: &[ConflictRecord],
        context: &ReviewContext,
    ) -> AdjudicationRequest {
        AdjudicationRequest::for_output::<ReviewerOutput>(
            AdjudicationTask::Review { reviewer: actor },
            prompts::review_instructions(actor),
            json!({
                "text": context.text,
                "candidates": candidates,
                "conflicts": conflicts,
                "structural_risks": context.structural_risks,
                "memory_advisory": context.memory_advisory,
            }),
        )
    }

    /// Ask A, B and C in turn. Fatal collaborator errors propagate.
    pub async fn collect(
        &self,
        candidates: &[CandidateTuple],
        conflicts: &[ConflictRecord],
        context: &ReviewContext,
    ) -> Result<ReviewBundle, AdjudicationError> {
        let mut bundle = ReviewBundle::default();

        for actor in Actor::REVIEWERS {
            let request = self.build_request(actor, candidates, conflicts, context);
            let output: ReviewerOutput =
                request_structured(self.adjudicator, &request, self.max_attempts).await?;

            let actions: Vec<ReviewAction> = output
                .actions
                .into_iter()
                .map(|proposed| proposed.attribute(actor))
                .collect();
            info!(reviewer = %actor, actions = actions.len(), "Review collected");
            bundle.insert(actor, actions);
        }

        Ok(bundle)
    }
}
