//! Opinion-Tuple Arbitration Library
//!
//! This library provides:
//! - Merging of perspective-agent triplets into flagged candidate tuples
//! - Deterministic conflict detection over a closed reference vocabulary
//! - Independent three-reviewer voting with a deterministic arbiter
//! - Targeted recheck escalation for incomplete or unresolved votes
//!
//! # Pipeline
//!
//! ```text
//! perspective (optional) → merger → conflict → collector
//!                                               │
//!                          applier ← arbiter ← recheck
//! ```
//!
//! Every collaborator call goes through the [`adjudicator::Adjudicator`]
//! trait. Everything else is pure and deterministic.
//!
//! # Usage
//!
//! ```no_run
//! use arbitration::{ArbitrationEngine, EngineConfig, ScriptedAdjudicator};
//!
//! # async fn demo() -> Result<(), arbitration::EngineError> {
//! let config = EngineConfig::default();
//! let adjudicator = ScriptedAdjudicator::new();
//! let engine = ArbitrationEngine::new(&adjudicator, &config);
//! let audit = engine.run_text("sample-1", "향은 좋은데 용기가 별로예요").await?;
//! println!("{} tuples kept", audit.candidates_after.len());
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod adjudicator;
pub mod applier;
pub mod arbiter;
pub mod audit;
pub mod candidate;
pub mod collector;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod merger;
pub mod perspective;
pub mod prompts;
pub mod recheck;
pub mod review;
pub mod vocabulary;

pub use adjudicator::{
    request_structured, AdjudicationError, AdjudicationRequest, AdjudicationTask, Adjudicator,
    BackendKind, ScriptedAdjudicator, ScriptedResponse,
};
pub use applier::{ActionApplier, AppliedSummary};
pub use arbiter::{ArbiterDecision, DecisionRule, DeterministicArbiter, VoteTally};
pub use audit::SampleAudit;
pub use candidate::{CandidateTuple, Polarity, Span, TupleId};
pub use collector::{ReviewBundle, ReviewCollector, ReviewContext, StructuralRisk};
pub use config::{ConfigError, ConflictMode, EngineConfig, PriorityFacets};
pub use conflict::{ConflictDetector, ConflictRecord, ConflictType};
pub use engine::{ArbitrationEngine, EngineError, SampleInput};
pub use merger::{AgentExtraction, CandidateMerger, RawTriplet};
pub use perspective::{Perspective, PerspectiveExtractor};
pub use recheck::{RecheckEscalator, RecheckResolution, RecheckTrigger};
pub use review::{ActionType, Actor, ReasonCode, ReviewAction};
pub use vocabulary::ReferenceVocabulary;
