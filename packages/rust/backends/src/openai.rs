//! OpenAI-compatible `chat/completions` backend.
//!
//! Works against OpenAI, Groq, OpenRouter and any server exposing the same
//! endpoint shape.

use std::time::Duration;

use async_trait::async_trait;
use examforge_shared::{BackendConfig, InstructionPayload};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{Backend, BackendError, endpoint, http_client, truncate_body};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Backend speaking the OpenAI `chat/completions` protocol.
pub struct OpenAiBackend {
    name: String,
    client: Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(
        config: &BackendConfig,
        api_key: String,
        timeout: Duration,
    ) -> examforge_shared::Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            client: http_client(timeout)?,
            url: endpoint(&config.base_url, "chat/completions"),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(backend = %self.name, model = %self.model))]
    async fn invoke(&self, payload: &InstructionPayload) -> Result<String, BackendError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &payload.system,
                },
                Message {
                    role: "user",
                    content: &payload.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(&self.name, e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::from_reqwest(&self.name, e, self.timeout))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| truncate_body(&body));
            return Err(BackendError::Provider {
                backend: self.name.clone(),
                status: status.as_u16(),
                message,
            });
        }

        let parsed: CompletionResponse = serde_json::from_str(&body).map_err(|e| {
            BackendError::invalid(&self.name, format!("failed to parse envelope: {e}"))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BackendError::invalid(&self.name, "no completion text in response"))?;

        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
