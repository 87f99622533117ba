//! # relay-llm
//!
//! Everything between an accepted chat envelope and the text sent back:
//!
//! - [`backend`] — the [`backend::ChatBackend`] trait and the Ollama
//!   implementation with hard per-call deadlines
//! - [`prompt`] — context-window bounding and prompt composition
//! - [`sanitizer`] — response post-processing and risk-pattern banners
//! - [`orchestrator`] — primary/fallback escalation that never raises past
//!   its boundary

#![deny(unsafe_code)]

pub mod backend;
pub mod orchestrator;
pub mod prompt;
pub mod sanitizer;

pub use backend::{BackendError, ChatBackend, ChatRequest, OllamaBackend};
pub use orchestrator::{BackendUsed, InferenceOrchestrator, InferenceResult};
pub use sanitizer::{ResponseSanitizer, Sanitized};
