//! # Inference Orchestrator
//!
//! Drives one accepted message through the primary backend and, on timeout
//! or failure, through the stricter fallback backend. This is the gateway's
//! only escalation point, and it never raises past its boundary: every
//! outcome — including both backends failing — degrades to a textual result
//! the session loop can deliver.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use relay_core::envelope::HistoryEntry;
use relay_settings::{BackendSettings, ContextSettings};
use tracing::{debug, error, instrument, warn};

use crate::backend::{ChatBackend, ChatRequest, RequestOptions};
use crate::prompt::{compose_fallback_prompt, compose_primary_prompt, ContextWindow};
use crate::sanitizer::ResponseSanitizer;

/// Fixed apology returned when both backends fail.
pub const APOLOGY: &str =
    "Sorry — the assistant is unavailable right now. Please try again in a moment.";

/// Which backend produced the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendUsed {
    /// The configured (or client-selected) primary model answered.
    Primary,
    /// The fallback model answered, or both backends failed.
    Fallback,
}

impl BackendUsed {
    /// Metric/log label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

/// Outcome of one orchestrated inference.
#[derive(Clone, Debug)]
pub struct InferenceResult {
    /// Response text (sanitized on the primary path).
    pub text: String,
    /// The model identifier that produced (or was supposed to produce) it.
    pub model: String,
    /// Which backend the text came from.
    pub backend_used: BackendUsed,
    /// Wall-clock seconds from acceptance to result.
    pub elapsed_seconds: f64,
    /// Whether the sanitizer wrapped the text in a warning banner.
    pub warning_applied: bool,
    /// Description of the terminal failure, when both backends failed.
    pub error: Option<String>,
}

/// Primary/fallback escalation around a [`ChatBackend`].
pub struct InferenceOrchestrator {
    backend: Arc<dyn ChatBackend>,
    sanitizer: ResponseSanitizer,
    settings: BackendSettings,
    context: ContextSettings,
}

impl InferenceOrchestrator {
    /// Create an orchestrator over the given backend.
    #[must_use]
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        sanitizer: ResponseSanitizer,
        settings: BackendSettings,
        context: ContextSettings,
    ) -> Self {
        Self {
            backend,
            sanitizer,
            settings,
            context,
        }
    }

    /// The configured primary model identifier.
    #[must_use]
    pub fn primary_model(&self) -> &str {
        &self.settings.primary_model
    }

    /// Run one message through primary-then-fallback escalation.
    ///
    /// Never returns an error: both-backends-down degrades to a fixed
    /// apology with [`InferenceResult::error`] set for the caller to log.
    #[instrument(skip_all, fields(history_len = history.len()))]
    pub async fn run(
        &self,
        message: &str,
        model_override: Option<&str>,
        history: &[HistoryEntry],
    ) -> InferenceResult {
        let started = Instant::now();
        let model = model_override
            .unwrap_or(&self.settings.primary_model)
            .to_owned();

        let window = ContextWindow::from_history(history, &self.context);
        let request = ChatRequest {
            model: model.clone(),
            prompt: compose_primary_prompt(&window, message),
            options: RequestOptions {
                temperature: self.settings.options.temperature,
                top_p: Some(self.settings.options.top_p),
                repeat_penalty: Some(self.settings.options.repeat_penalty),
                num_predict: self.settings.options.num_predict,
                num_ctx: Some(self.settings.options.num_ctx),
            },
        };
        let deadline = Duration::from_secs_f64(self.settings.primary_timeout_secs);

        counter!("backend_requests_total", "backend" => "primary").increment(1);
        match self.backend.chat(&request, deadline).await {
            Ok(text) => {
                let sanitized = self.sanitizer.sanitize(&text);
                let elapsed = started.elapsed().as_secs_f64();
                histogram!("inference_duration_seconds", "backend" => "primary").record(elapsed);
                debug!(elapsed_secs = elapsed, "primary backend answered");
                InferenceResult {
                    text: sanitized.text,
                    model,
                    backend_used: BackendUsed::Primary,
                    elapsed_seconds: elapsed,
                    warning_applied: sanitized.warning_applied,
                    error: None,
                }
            }
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "primary backend failed, escalating to fallback");
                counter!("backend_failovers_total", "reason" => err.kind()).increment(1);
                self.run_fallback(message, started).await
            }
        }
    }

    /// Fallback call: stricter instruction, lower temperature, no context.
    async fn run_fallback(&self, message: &str, started: Instant) -> InferenceResult {
        let model = self.settings.fallback_model.clone();
        let request = ChatRequest {
            model: model.clone(),
            prompt: compose_fallback_prompt(message),
            options: RequestOptions {
                temperature: self.settings.fallback_temperature,
                num_predict: self.settings.options.num_predict,
                ..RequestOptions::default()
            },
        };
        let deadline = Duration::from_secs_f64(self.settings.fallback_timeout_secs);

        counter!("backend_requests_total", "backend" => "fallback").increment(1);
        match self.backend.chat(&request, deadline).await {
            Ok(text) => {
                let elapsed = started.elapsed().as_secs_f64();
                histogram!("inference_duration_seconds", "backend" => "fallback").record(elapsed);
                InferenceResult {
                    text: text.trim().to_owned(),
                    model,
                    backend_used: BackendUsed::Fallback,
                    elapsed_seconds: elapsed,
                    warning_applied: false,
                    error: None,
                }
            }
            Err(err) => {
                error!(kind = err.kind(), error = %err, "fallback backend also failed");
                counter!("backend_exhausted_total").increment(1);
                InferenceResult {
                    text: APOLOGY.to_owned(),
                    model,
                    backend_used: BackendUsed::Fallback,
                    elapsed_seconds: started.elapsed().as_secs_f64(),
                    warning_applied: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
