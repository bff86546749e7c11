//! Text generation backends used by lead triage.
//!
//! Both clients speak plain chat completion (system + user message, non-streaming) and return the
//! assistant's text. The [`TextGenerator`] trait is the seam tests stub out.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::config::{self, Config, TriageBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api error: {0}")]
    Api(String),
    #[error("llm returned no content")]
    Empty,
}

/// One chat message (role + content).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Run one completion and return the assistant text.
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

/// Build the configured backend, or `None` for keyword-only triage.
pub fn generator_from_config(config: &Config) -> Option<Arc<dyn TextGenerator>> {
    let triage = &config.triage;
    let timeout = Duration::from_secs(triage.timeout_secs.max(1));
    match triage.backend {
        TriageBackend::None => None,
        TriageBackend::Ollama => Some(Arc::new(OllamaClient::new(
            triage.base_url.clone(),
            triage.model.clone(),
            timeout,
        ))),
        TriageBackend::Openai => Some(Arc::new(OpenAiClient::new(
            triage.base_url.clone(),
            triage.model.clone(),
            config::resolve_llm_api_key(config),
            timeout,
        ))),
    }
}

/// reqwest client with a request timeout; falls back to the default client if the builder fails.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            log::warn!("llm: http client builder failed ({}), using defaults", e);
            reqwest::Client::new()
        })
}
