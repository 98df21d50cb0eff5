//! Action applier: turns arbiter decisions into the final candidate set.
//!
//! Only DROP and FLIP change data. Aspect references are never rewritten,
//! so MERGE (which the arbiter does not emit anyway) is a no-op here too.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::arbiter::ArbiterDecision;
use crate::candidate::{CandidateTuple, Polarity, TupleId};
use crate::review::ActionType;

/// Tuples touched by the applier, by effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppliedSummary {
    pub dropped: Vec<TupleId>,
    pub flipped: Vec<TupleId>,
    /// FLAG decisions plus tuples that received no decision
    pub flagged: Vec<TupleId>,
    /// Subset of `flagged` with no decision at all
    pub undecided: Vec<TupleId>,
}

/// Stateless applier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionApplier;

impl ActionApplier {
    pub fn apply(
        &self,
        candidates: &[CandidateTuple],
        decisions: &[ArbiterDecision],
    ) -> (Vec<CandidateTuple>, AppliedSummary) {
        let mut by_tuple: HashMap<&TupleId, &ArbiterDecision> = HashMap::new();
        for decision in decisions {
            for tuple_id in &decision.target_tuple_ids {
                by_tuple.entry(tuple_id).or_insert(decision);
            }
        }

        let mut summary = AppliedSummary::default();
        let mut kept = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let tuple_id = &candidate.tuple_id;
            let Some(decision) = by_tuple.get(tuple_id) else {
                summary.flagged.push(tuple_id.clone());
                summary.undecided.push(tuple_id.clone());
                kept.push(candidate.clone());
                continue;
            };

            match decision.action_type {
                ActionType::Drop => {
                    summary.dropped.push(tuple_id.clone());
                }
                ActionType::Flip => {
                    let mut updated = candidate.clone();
                    match decision
                        .new_value
                        .as_deref()
                        .and_then(|v| v.parse::<Polarity>().ok())
                    {
                        Some(polarity) => {
                            updated.polarity = polarity;
                            summary.flipped.push(tuple_id.clone());
                        }
                        None => {
                            warn!(tuple_id = %tuple_id, "FLIP without usable polarity left unchanged");
                        }
                    }
                    kept.push(updated);
                }
                ActionType::Flag => {
                    summary.flagged.push(tuple_id.clone());
                    kept.push(candidate.clone());
                }
                ActionType::Keep | ActionType::Merge => kept.push(candidate.clone()),
            }
        }

        info!(
            kept = kept.len(),
            dropped = summary.dropped.len(),
            flipped = summary.flipped.len(),
            flagged = summary.flagged.len(),
            "Decisions applied"
        );
        (kept, summary)
    }
}
