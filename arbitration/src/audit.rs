//! Per-sample audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::applier::AppliedSummary;
use crate::arbiter::ArbiterDecision;
use crate::candidate::{CandidateTuple, TupleId};
use crate::collector::ReviewBundle;
use crate::conflict::ConflictRecord;
use crate::recheck::{RecheckRecord, RecheckResolution};

/// Everything one engine run saw and decided.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleAudit {
    pub run_id: Uuid,
    pub sample_id: String,
    /// Instruction version the reviews were produced with
    pub prompt_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub candidates_before: Vec<CandidateTuple>,
    pub candidates_after: Vec<CandidateTuple>,
    pub conflicts: Vec<ConflictRecord>,
    pub reviews: ReviewBundle,
    pub rechecks: Vec<RecheckRecord>,
    pub resolutions: Vec<RecheckResolution>,
    pub decisions: Vec<ArbiterDecision>,
    pub summary: AppliedSummary,
}

impl SampleAudit {
    /// Decision covering a tuple.
    pub fn decision_for(&self, tuple_id: &TupleId) -> Option<&ArbiterDecision> {
        self.decisions
            .iter()
            .find(|d| d.target_tuple_ids.contains(tuple_id))
    }

    /// Final candidate for a tuple, if it survived.
    pub fn final_candidate(&self, tuple_id: &TupleId) -> Option<&CandidateTuple> {
        self.candidates_after.iter().find(|c| &c.tuple_id == tuple_id)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Single-line JSON for JSONL output.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
