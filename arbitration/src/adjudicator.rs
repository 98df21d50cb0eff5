//! Structured adjudication collaborator
//!
//! The engine never talks to a text generator directly. It sends an
//! [`AdjudicationRequest`] (instructions, JSON context, expected JSON schema)
//! to an [`Adjudicator`] and validates the answer by deserializing it into
//! the expected type.
//!
//! # Retry policy
//!
//! ```text
//! attempt 1..=max_attempts
//!   ├─ answer parses        → Ok(answer)
//!   ├─ fatal backend error  → Err (propagates, sample abandoned)
//!   └─ transport/parse error → retry
//! exhausted
//!   ├─ BackendKind::Mock       → Ok(T::default()) + warning
//!   └─ BackendKind::Production → Err(Exhausted), fatal
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::review::Actor;

/// Errors from the adjudication collaborator
#[derive(Debug, Error)]
pub enum AdjudicationError {
    #[error("Adjudication request failed: {0}")]
    RequestFailed(String),

    #[error("Answer did not match the expected schema: {0}")]
    InvalidOutput(String),

    #[error("{task}: no valid answer after {attempts} attempts (last error: {last_error})")]
    Exhausted {
        task: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Backend failure: {0}")]
    Fatal(String),
}

impl AdjudicationError {
    /// Fatal errors abandon the whole sample.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Exhausted { .. } | Self::Fatal(_))
    }
}

/// What a request is asking for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdjudicationTask {
    /// Perspective-biased triplet extraction
    Extraction { perspective: String },
    /// Independent review by one reviewer role
    Review { reviewer: Actor },
    /// Targeted re-adjudication of one conflict group
    Recheck { group: String },
}

impl AdjudicationTask {
    /// Routing key, e.g. `extraction:negation`, `review:A`, `recheck:t0,t1`.
    pub fn key(&self) -> String {
        match self {
            Self::Extraction { perspective } => format!("extraction:{}", perspective),
            Self::Review { reviewer } => format!("review:{}", reviewer),
            Self::Recheck { group } => format!("recheck:{}", group),
        }
    }

    /// Key without the task-specific suffix.
    pub fn kind_key(&self) -> &'static str {
        match self {
            Self::Extraction { .. } => "extraction",
            Self::Review { .. } => "review",
            Self::Recheck { .. } => "recheck",
        }
    }
}

impl std::fmt::Display for AdjudicationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One structured request to the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjudicationRequest {
    pub task: AdjudicationTask,
    pub instructions: String,
    pub context: Value,
    /// JSON schema the answer must satisfy
    pub output_schema: Value,
}

impl AdjudicationRequest {
    /// Build a request whose expected schema is derived from `T`.
    pub fn for_output<T: JsonSchema>(
        task: AdjudicationTask,
        instructions: String,
        context: Value,
    ) -> Self {
        let output_schema =
            serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        Self {
            task,
            instructions,
            context,
            output_schema,
        }
    }
}

/// Whether exhausted retries may degrade to a default answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Test/replay backend: exhaustion yields an empty answer
    Mock,
    /// Real generator: exhaustion is fatal
    Production,
}

/// Backend that turns a request into a JSON answer.
#[async_trait]
pub trait Adjudicator: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// One attempt. Retries are handled by [`request_structured`].
    async fn complete(&self, request: &AdjudicationRequest) -> Result<Value, AdjudicationError>;
}

/// Issue a request with bounded retries and schema validation.
pub async fn request_structured<T>(
    adjudicator: &dyn Adjudicator,
    request: &AdjudicationRequest,
    max_attempts: u32,
) -> Result<T, AdjudicationError>
where
    T: DeserializeOwned + Default,
{
    let attempts = max_attempts.max(1);
    let mut last_error: Option<AdjudicationError> = None;

    for attempt in 1..=attempts {
        match adjudicator.complete(request).await {
            Ok(value) => match serde_json::from_value::<T>(value) {
                Ok(parsed) => {
                    debug!(task = %request.task, attempt, "Adjudication answered");
                    return Ok(parsed);
                }
                Err(e) => {
                    warn!(task = %request.task, attempt, error = %e, "Answer failed schema validation");
                    last_error = Some(AdjudicationError::InvalidOutput(e.to_string()));
                }
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(task = %request.task, attempt, error = %e, "Adjudication attempt failed");
                last_error = Some(e);
            }
        }
    }

    let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
    match adjudicator.backend() {
        BackendKind::Production => Err(AdjudicationError::Exhausted {
            task: request.task.key(),
            attempts,
            last_error,
        }),
        BackendKind::Mock => {
            warn!(
                task = %request.task,
                attempts,
                last_error = %last_error,
                "Retries exhausted, using empty answer"
            );
            Ok(T::default())
        }
    }
}

/// Scripted step for [`ScriptedAdjudicator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedResponse {
    Answer(Value),
    Failure(String),
    Fatal(String),
}

/// Replays queued answers per task key and records every call.
///
/// Lookup tries the full key (`recheck:t0,t1`) first, then the bare kind
/// (`recheck`). A missing script is a non-fatal request failure.
pub struct ScriptedAdjudicator {
    backend: BackendKind,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<AdjudicationTask>>,
}

impl ScriptedAdjudicator {
    pub fn new() -> Self {
        Self {
            backend: BackendKind::Mock,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Build from a replay document: `{"review:A": [answer, ...], ...}`.
    pub fn from_replay(replay: &Value) -> Result<Self, AdjudicationError> {
        let map = replay.as_object().ok_or_else(|| {
            AdjudicationError::InvalidOutput("replay document must be an object".to_string())
        })?;
        let scripted = Self::new();
        for (key, answers) in map {
            match answers {
                Value::Array(items) => {
                    for item in items {
                        scripted.push(key, ScriptedResponse::Answer(item.clone()));
                    }
                }
                single => scripted.push(key, ScriptedResponse::Answer(single.clone())),
            }
        }
        Ok(scripted)
    }

    pub fn respond(self, key: &str, answer: Value) -> Self {
        self.push(key, ScriptedResponse::Answer(answer));
        self
    }

    pub fn fail(self, key: &str, message: &str) -> Self {
        self.push(key, ScriptedResponse::Failure(message.to_string()));
        self
    }

    pub fn push(&self, key: &str, response: ScriptedResponse) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .push_back(response);
    }

    /// Every task requested so far, in call order.
    pub fn calls(&self) -> Vec<AdjudicationTask> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|task| task.kind_key() == kind)
            .count()
    }

    fn next_response(&self, task: &AdjudicationTask) -> Option<ScriptedResponse> {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        for key in [task.key(), task.kind_key().to_string()] {
            if let Some(response) = scripts.get_mut(&key).and_then(VecDeque::pop_front) {
                return Some(response);
            }
        }
        None
    }
}

impl Default for ScriptedAdjudicator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adjudicator for ScriptedAdjudicator {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn complete(&self, request: &AdjudicationRequest) -> Result<Value, AdjudicationError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.task.clone());

        match self.next_response(&request.task) {
            Some(ScriptedResponse::Answer(value)) => Ok(value),
            Some(ScriptedResponse::Failure(message)) => {
                Err(AdjudicationError::RequestFailed(message))
            }
            Some(ScriptedResponse::Fatal(message)) => Err(AdjudicationError::Fatal(message)),
            None => Err(AdjudicationError::RequestFailed(format!(
                "no scripted response for {}",
                request.task
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize, JsonSchema)]
    struct Answer {
        #[serde(default)]
        items: Vec<String>,
    }

    fn request() -> AdjudicationRequest {
        AdjudicationRequest::for_output::<Answer>(
            AdjudicationTask::Review {
                reviewer: Actor::A,
            },
            "review".to_string(),
            json!({}),
        )
    }

    #[test]
    fn test_task_keys() {
        assert_eq!(
            AdjudicationTask::Extraction {
                perspective: "negation".to_string()
            }
            .key(),
            "extraction:negation"
        );
        assert_eq!(
            AdjudicationTask::Review {
                reviewer: Actor::C
            }
            .key(),
            "review:C"
        );
        assert_eq!(
            AdjudicationTask::Recheck {
                group: "t0,t1".to_string()
            }
            .kind_key(),
            "recheck"
        );
    }

    #[test]
    fn test_request_carries_schema() {
        let req = request();
        assert!(req.output_schema.to_string().contains("items"));
    }

    #[tokio::test]
    async fn test_retries_past_invalid_answer() {
        let scripted = ScriptedAdjudicator::new()
            .respond("review:A", json!({"items": 3}))
            .respond("review:A", json!({"items": ["ok"]}));
        let answer: Answer = request_structured(&scripted, &request(), 3).await.unwrap();
        assert_eq!(answer.items, vec!["ok".to_string()]);
        assert_eq!(scripted.call_count("review"), 2);
    }

    #[tokio::test]
    async fn test_mock_exhaustion_yields_default() {
        let scripted = ScriptedAdjudicator::new().fail("review", "timeout");
        let answer: Answer = request_structured(&scripted, &request(), 2).await.unwrap();
        assert!(answer.items.is_empty());
        assert_eq!(scripted.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_production_exhaustion_is_fatal() {
        let scripted = ScriptedAdjudicator::new().with_backend(BackendKind::Production);
        let err = request_structured::<Answer>(&scripted, &request(), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, AdjudicationError::Exhausted { attempts: 2, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_fatal_error_stops_retrying() {
        let scripted = ScriptedAdjudicator::new();
        scripted.push("review:A", ScriptedResponse::Fatal("auth revoked".to_string()));
        let err = request_structured::<Answer>(&scripted, &request(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, AdjudicationError::Fatal(_)));
        assert_eq!(scripted.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_document() {
        let scripted = ScriptedAdjudicator::from_replay(&json!({
            "review:A": [{"items": ["first"]}, {"items": ["second"]}],
            "review": {"items": ["fallback"]}
        }))
        .unwrap();
        let req = request();
        let first: Answer = request_structured(&scripted, &req, 1).await.unwrap();
        let second: Answer = request_structured(&scripted, &req, 1).await.unwrap();
        let third: Answer = request_structured(&scripted, &req, 1).await.unwrap();
        assert_eq!(first.items, vec!["first".to_string()]);
        assert_eq!(second.items, vec!["second".to_string()]);
        assert_eq!(third.items, vec!["fallback".to_string()]);

        assert!(ScriptedAdjudicator::from_replay(&json!([1, 2])).is_err());
    }
}
