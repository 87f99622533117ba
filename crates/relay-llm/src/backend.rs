//! # Chat Backend
//!
//! Abstraction over the text-generation service. The gateway only ever needs
//! non-streaming completions: one prompt in, one text out. [`OllamaBackend`]
//! implements the trait against the Ollama-compatible `/api/chat` endpoint.
//!
//! Deadlines are hard: [`OllamaBackend::chat`] wraps the request in
//! [`tokio::time::timeout`], so exceeding the deadline drops the in-flight
//! request and returns [`BackendError::Timeout`] immediately — it does not
//! wait for the transport to give up on its own.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Reachability probe timeout for `/api/tags`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur when calling the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The call exceeded its deadline.
    #[error("backend call timed out after {secs}s")]
    Timeout {
        /// The deadline that was exceeded, in seconds.
        secs: f64,
    },

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}")]
    Api {
        /// HTTP status code.
        status: u16,
    },

    /// Transport-level failure (connect, TLS, read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered 200 with a body we could not interpret.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BackendError {
    /// Error discriminator used for logs and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Api { .. } => "upstream",
            Self::Http(_) => "transport",
            Self::Json(_) => "parse",
        }
    }
}

/// Sampling options forwarded with a chat request.
///
/// Fields set to `None` are omitted from the wire body, matching how the
/// fallback call sends a reduced option set.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RequestOptions {
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Repeat penalty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
    /// Maximum tokens to generate.
    pub num_predict: u32,
    /// Context window size in tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

/// One non-streaming completion request.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// Fully composed prompt.
    pub prompt: String,
    /// Sampling options.
    pub options: RequestOptions,
}

/// Non-streaming chat backend.
///
/// Implementors must be `Send + Sync`; one instance is shared across all
/// connection loops.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run one completion with a hard deadline.
    async fn chat(&self, request: &ChatRequest, deadline: Duration) -> BackendResult<String>;

    /// List the models the backend has installed.
    async fn list_models(&self) -> BackendResult<Vec<String>>;

    /// Cheap liveness probe, used by the health endpoint.
    async fn is_reachable(&self) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Wire body for `POST /api/chat`.
#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 1],
    stream: bool,
    options: &'a RequestOptions,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Success body of `POST /api/chat`.
#[derive(Deserialize)]
struct ChatCompletion {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Body of `GET /api/tags`.
#[derive(Deserialize)]
struct TagsBody {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Ollama-compatible HTTP backend.
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a backend client for the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a backend client with a shared HTTP client.
    #[must_use]
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            let _ = base_url.pop();
        }
        Self { base_url, client }
    }

    async fn post_chat(&self, request: &ChatRequest) -> BackendResult<String> {
        let body = ChatBody {
            model: &request.model,
            messages: [WireMessage {
                role: "user",
                content: &request.prompt,
            }],
            stream: false,
            options: &request.options,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        let completion: ChatCompletion = serde_json::from_str(&text)?;
        Ok(completion.message.content)
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    #[instrument(skip_all, fields(model = %request.model))]
    async fn chat(&self, request: &ChatRequest, deadline: Duration) -> BackendResult<String> {
        debug!(deadline_secs = deadline.as_secs_f64(), "sending chat request");
        match tokio::time::timeout(deadline, self.post_chat(request)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                secs: deadline.as_secs_f64(),
            }),
        }
    }

    async fn list_models(&self) -> BackendResult<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
            });
        }

        let body: TagsBody = serde_json::from_str(&response.text().await?)?;
        Ok(body.models.into_iter().map(|m| m.name).collect())
    }

    async fn is_reachable(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
