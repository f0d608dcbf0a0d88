//! Generative backend adapters.
//!
//! Each adapter takes an [`InstructionPayload`] and returns the model's raw
//! text, or a [`BackendError`]. Adapters hold no per-request state; the
//! pipeline tries them in priority order.
//!
//! - [`OpenAiBackend`]: OpenAI-compatible `chat/completions` (OpenAI, Groq, OpenRouter)
//! - [`GeminiBackend`]: Google Gemini `generateContent`

mod gemini;
mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use examforge_shared::{
    BackendConfig, BackendKind, ExamForgeError, InstructionPayload, resolve_api_key,
};
use reqwest::Client;
use tracing::{info, warn};

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("ExamForge/", env!("CARGO_PKG_VERSION"));

/// Longest provider error body echoed into a [`BackendError`].
const MAX_ERROR_BODY: usize = 300;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a single backend invocation. Always recoverable by trying the
/// next backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Connection, DNS, TLS or body transfer failure.
    #[error("{backend}: network error: {message}")]
    Network { backend: String, message: String },

    /// The provider answered with a non-success status.
    #[error("{backend}: provider returned HTTP {status}: {message}")]
    Provider {
        backend: String,
        status: u16,
        message: String,
    },

    /// The invocation did not finish within its time budget.
    #[error("{backend}: timed out after {}s", elapsed.as_secs())]
    Timeout { backend: String, elapsed: Duration },

    /// The provider answered 2xx but the envelope carried no usable text.
    #[error("{backend}: invalid response: {message}")]
    InvalidResponse { backend: String, message: String },
}

impl BackendError {
    /// Classify a `reqwest` failure.
    pub(crate) fn from_reqwest(backend: &str, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                backend: backend.to_string(),
                elapsed: timeout,
            }
        } else {
            Self::Network {
                backend: backend.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn invalid(backend: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            backend: backend.to_string(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A generative provider the pipeline can ask for questions.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name used in logs and health output.
    fn name(&self) -> &str;

    /// Send the directive and return the model's raw text.
    async fn invoke(&self, payload: &InstructionPayload) -> Result<String, BackendError>;
}

// ---------------------------------------------------------------------------
// Construction from config
// ---------------------------------------------------------------------------

/// Build a backend for a single config entry.
pub fn build_backend(
    config: &BackendConfig,
    api_key: String,
    timeout: Duration,
) -> examforge_shared::Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match config.kind {
        BackendKind::Openai => Arc::new(OpenAiBackend::new(config, api_key, timeout)?),
        BackendKind::Gemini => Arc::new(GeminiBackend::new(config, api_key, timeout)?),
    };
    Ok(backend)
}

/// Build every configured backend whose API key is available, preserving
/// priority order. Backends without a key are skipped with a warning.
pub fn build_backends(
    configs: &[BackendConfig],
    timeout: Duration,
) -> examforge_shared::Result<Vec<Arc<dyn Backend>>> {
    let mut backends = Vec::with_capacity(configs.len());
    for config in configs {
        match resolve_api_key(config) {
            Ok(key) => {
                backends.push(build_backend(config, key, timeout)?);
                info!(backend = %config.name, model = %config.model, "backend enabled");
            }
            Err(e) => warn!(backend = %config.name, error = %e, "backend disabled"),
        }
    }

    if backends.is_empty() {
        warn!("no generative backends are enabled; only cached questions can be served");
    }
    Ok(backends)
}

/// Build the shared HTTP client for one backend.
pub(crate) fn http_client(timeout: Duration) -> examforge_shared::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ExamForgeError::Backend(format!("failed to build HTTP client: {e}")))
}

/// Join an endpoint onto a configured API root, keeping the root's path.
pub(crate) fn endpoint(base_url: &url::Url, path: &str) -> String {
    format!("{}/{}", base_url.as_str().trim_end_matches('/'), path)
}

/// Shorten a provider error body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
