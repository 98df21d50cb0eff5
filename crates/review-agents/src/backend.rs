//! Production adjudicator over an OpenAI-compatible `/chat/completions` API.
//!
//! The request instructions become the system message and the JSON context
//! the user message. The expected schema is passed as a `json_schema`
//! response format; the answer content is parsed as JSON and handed back
//! to the engine for validation.

use anyhow::{Context, Result};
use arbitration::{AdjudicationError, AdjudicationRequest, Adjudicator, BackendKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LlmEndpoint;

pub struct ChatCompletionsAdjudicator {
    client: reqwest::Client,
    endpoint: LlmEndpoint,
}

impl ChatCompletionsAdjudicator {
    pub fn new(endpoint: LlmEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, endpoint })
    }

    /// JSON body for one request.
    pub fn request_body(&self, request: &AdjudicationRequest) -> Value {
        let context =
            serde_json::to_string_pretty(&request.context).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.endpoint.model,
            "messages": [
                {"role": "system", "content": request.instructions},
                {"role": "user", "content": format!("## Context\n\n```json\n{}\n```", context)}
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.task.kind_key(),
                    "schema": request.output_schema,
                }
            },
            "temperature": 0.0
        })
    }
}

/// Parse answer content, tolerating a surrounding markdown fence.
pub fn parse_content(content: &str) -> Result<Value, AdjudicationError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(body).map_err(|e| AdjudicationError::InvalidOutput(e.to_string()))
}

#[async_trait]
impl Adjudicator for ChatCompletionsAdjudicator {
    fn backend(&self) -> BackendKind {
        BackendKind::Production
    }

    async fn complete(&self, request: &AdjudicationRequest) -> Result<Value, AdjudicationError> {
        let mut builder = self
            .client
            .post(self.endpoint.completions_url())
            .header("Content-Type", "application/json")
            .json(&self.request_body(request));
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AdjudicationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AdjudicationError::Fatal(format!(
                "endpoint rejected credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdjudicationError::RequestFailed(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let resp_json: Value = response
            .json()
            .await
            .map_err(|e| AdjudicationError::InvalidOutput(e.to_string()))?;
        let content = resp_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AdjudicationError::InvalidOutput("response has no content".into()))?;

        debug!(task = %request.task, chars = content.len(), "Completion received");
        parse_content(content)
    }
}
