use serde::Deserialize;
use std::time::Duration;

/// Chat-completions endpoint used for every adjudication request.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmEndpoint {
    /// Base URL, e.g. `http://localhost:8000/v1`
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl LlmEndpoint {
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.url.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Process-level settings, read from the environment.
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    pub endpoint: LlmEndpoint,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            endpoint: LlmEndpoint {
                url: std::env::var("ARBITER_LLM_URL")
                    .unwrap_or_else(|_| "http://localhost:8000/v1".into()),
                model: std::env::var("ARBITER_LLM_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".into()),
                api_key: std::env::var("ARBITER_LLM_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
                timeout_secs: std::env::var("ARBITER_LLM_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(120),
            },
        }
    }
}
