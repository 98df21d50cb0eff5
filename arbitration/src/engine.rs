//! Arbitration Engine: the per-sample pipeline
//!
//! ```text
//! [perspective extraction]   run_text only
//!          │
//!          ▼
//! merge → detect → collect reviews → recheck → arbitrate → apply
//!                        │                │
//!                  collaborator     collaborator
//! ```
//!
//! Every stage runs to completion before the next starts and collaborator
//! calls are awaited one at a time. Candidates are not mutated before the
//! apply step, so abandoning a sample on a fatal error leaves nothing half
//! written. A new recheck ledger is created per run.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::adjudicator::{AdjudicationError, Adjudicator};
use crate::applier::ActionApplier;
use crate::arbiter::DeterministicArbiter;
use crate::audit::SampleAudit;
use crate::collector::{ReviewCollector, ReviewContext, StructuralRisk};
use crate::config::{ConfigError, EngineConfig};
use crate::conflict::ConflictDetector;
use crate::merger::{AgentExtraction, CandidateMerger};
use crate::perspective::PerspectiveExtractor;
use crate::prompts::PROMPT_VERSION;
use crate::recheck::RecheckEscalator;

/// Errors that abandon a sample
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Adjudication failed: {0}")]
    Adjudication(#[from] AdjudicationError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// One sample to arbitrate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleInput {
    pub sample_id: String,
    #[serde(default)]
    pub text: Option<String>,
    /// Pre-extracted perspective output; empty means extract from `text`
    #[serde(default)]
    pub extractions: Vec<AgentExtraction>,
    #[serde(default)]
    pub structural_risks: Vec<StructuralRisk>,
    #[serde(default)]
    pub memory_advisory: Option<String>,
}

impl SampleInput {
    pub fn from_text(sample_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sample_id: sample_id.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Whether the perspective extraction stage must run first.
    pub fn needs_extraction(&self) -> bool {
        self.extractions.is_empty() && self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Borrowing pipeline over one collaborator and one configuration.
pub struct ArbitrationEngine<'a> {
    adjudicator: &'a dyn Adjudicator,
    config: &'a EngineConfig,
}

impl<'a> ArbitrationEngine<'a> {
    pub fn new(adjudicator: &'a dyn Adjudicator, config: &'a EngineConfig) -> Self {
        Self {
            adjudicator,
            config,
        }
    }

    fn max_attempts(&self) -> u32 {
        self.config.adjudication.max_attempts
    }

    /// Run the full pipeline over pre-extracted triplets.
    pub async fn run(&self, input: SampleInput) -> Result<SampleAudit, EngineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let vocabulary = &self.config.vocabulary;
        info!(sample_id = %input.sample_id, run_id = %run_id, "Arbitration started");

        let merger = CandidateMerger::new(&self.config.merger, vocabulary)?;
        let candidates = merger.merge(&input.extractions, input.text.as_deref());

        let conflicts = ConflictDetector::new(self.config, vocabulary).detect(&candidates);
        info!(
            sample_id = %input.sample_id,
            candidates = candidates.len(),
            conflicts = conflicts.len(),
            "Conflicts detected"
        );

        let context = ReviewContext {
            text: input.text.clone(),
            structural_risks: input.structural_risks.clone(),
            memory_advisory: input.memory_advisory.clone(),
        };
        let reviews = ReviewCollector::new(self.adjudicator, self.max_attempts())
            .collect(&candidates, &conflicts, &context)
            .await?;

        let mut escalator = RecheckEscalator::new(self.adjudicator, self.max_attempts());
        escalator.escalate(&candidates, &conflicts, &reviews).await?;
        let (resolutions, rechecks) = escalator.into_parts();

        let decisions = DeterministicArbiter::new(&self.config.priority_facets).decide(
            &candidates,
            &conflicts,
            &reviews,
            &resolutions,
        );
        let (candidates_after, summary) = ActionApplier.apply(&candidates, &decisions);

        let audit = SampleAudit {
            run_id,
            sample_id: input.sample_id,
            prompt_version: PROMPT_VERSION.to_string(),
            started_at,
            finished_at: Utc::now(),
            candidates_before: candidates,
            candidates_after,
            conflicts,
            reviews,
            rechecks,
            resolutions,
            decisions,
            summary,
        };
        info!(
            sample_id = %audit.sample_id,
            run_id = %run_id,
            kept = audit.candidates_after.len(),
            rechecks = audit.rechecks.len(),
            duration_ms = audit.duration_ms(),
            "Arbitration finished"
        );
        Ok(audit)
    }

    async fn extract(&self, text: &str) -> Result<Vec<AgentExtraction>, EngineError> {
        let extractor = PerspectiveExtractor::new(
            self.adjudicator,
            &self.config.vocabulary,
            self.max_attempts(),
        );
        Ok(extractor.extract(text).await?)
    }

    /// Extract from raw text with the three perspectives, then [`Self::run`].
    pub async fn run_text(
        &self,
        sample_id: impl Into<String>,
        text: &str,
    ) -> Result<SampleAudit, EngineError> {
        let mut input = SampleInput::from_text(sample_id, text);
        input.extractions = self.extract(text).await?;
        self.run(input).await
    }

    /// [`Self::run_text`] when the input carries only text, else [`Self::run`].
    pub async fn run_input(&self, mut input: SampleInput) -> Result<SampleAudit, EngineError> {
        if input.needs_extraction() {
            let text = input.text.clone().unwrap_or_default();
            input.extractions = self.extract(&text).await?;
        }
        self.run(input).await
    }
}
