//! Typed settings structures with compiled defaults.
//!
//! One structure per concern, every field named and defaulted. Defaults
//! mirror the deployment this gateway grew up with: a local Ollama instance
//! serving a small tool-capable primary model with a plain fallback.

use serde::{Deserialize, Serialize};

/// Top-level settings for the relay gateway.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP/WebSocket server settings.
    pub server: ServerSettings,
    /// Text-generation backend settings.
    pub backend: BackendSettings,
    /// Conversation context bounding.
    pub context: ContextSettings,
    /// Response sanitizer rules.
    pub sanitizer: SanitizerSettings,
    /// Chat log sink settings.
    pub log: ChatLogSettings,
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port to bind (0 for auto-assign, used by tests).
    pub port: u16,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect clients silent for longer than this many seconds.
    pub heartbeat_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_message_size: 1024 * 1024,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
        }
    }
}

/// Sampling options forwarded to the backend on primary calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOptions {
    /// Sampling temperature. Low for deterministic output.
    pub temperature: f64,
    /// Nucleus sampling bound.
    pub top_p: f64,
    /// Repeat penalty, tuned high to damp loops on small models.
    pub repeat_penalty: f64,
    /// Maximum tokens to generate.
    pub num_predict: u32,
    /// Context window size in tokens.
    pub num_ctx: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            repeat_penalty: 1.2,
            num_predict: 2000,
            num_ctx: 4096,
        }
    }
}

/// Text-generation backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Base URL of the Ollama-compatible API.
    pub base_url: String,
    /// Model tried first for every request.
    pub primary_model: String,
    /// Model used when the primary times out or errors.
    pub fallback_model: String,
    /// Hard deadline for the primary call, in seconds.
    pub primary_timeout_secs: f64,
    /// Hard deadline for the fallback call, in seconds.
    pub fallback_timeout_secs: f64,
    /// Sampling options for primary calls.
    pub options: GenerationOptions,
    /// Temperature for fallback calls (stricter than primary).
    pub fallback_temperature: f64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            primary_model: "orieg/gemma3-tools:4b-it-qat".to_string(),
            fallback_model: "gemma3:4b".to_string(),
            primary_timeout_secs: 20.0,
            fallback_timeout_secs: 15.0,
            options: GenerationOptions::default(),
            fallback_temperature: 0.05,
        }
    }
}

/// Conversation context bounding.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContextSettings {
    /// Maximum unique history entries embedded in the prompt.
    pub max_entries: usize,
    /// How many most-recent history entries are scanned for uniques.
    pub scan_window: usize,
    /// Per-entry content cap in characters.
    pub max_entry_chars: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_entries: 4,
            scan_window: 8,
            max_entry_chars: 200,
        }
    }
}

/// One risk rule scanned against backend output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRule {
    /// Case-insensitive regex matched against the response text.
    pub pattern: String,
    /// Short label for logs describing what the pattern catches.
    pub label: String,
}

/// Response sanitizer settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SanitizerSettings {
    /// Ordered risk rules. Ships empty, which makes the scan a no-op.
    pub risk_rules: Vec<RiskRule>,
}

/// Chat log sink settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatLogSettings {
    /// Whether chat logging is enabled at all.
    pub enabled: bool,
    /// Directory for per-day, per-client log files.
    pub dir: String,
}

impl Default for ChatLogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "chat_logs".to_string(),
        }
    }
}
