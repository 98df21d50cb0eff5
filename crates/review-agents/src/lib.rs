//! Process-level wiring for the arbitration engine.
//!
//! - `config`: endpoint settings from the environment
//! - `backend`: production adjudicator over `/chat/completions`
//! - `runner`: JSONL batch loop used by the `review-agents` binary

pub mod backend;
pub mod config;
pub mod runner;

pub use backend::ChatCompletionsAdjudicator;
pub use config::{AgentsConfig, LlmEndpoint};
pub use runner::{process_stream, BatchStats};
