//! Wire envelopes for the client-facing WebSocket protocol.
//!
//! Inbound frames deserialize into [`ClientEnvelope`]; outbound frames are
//! the [`ServerMessage`] tagged enum. Deserialization is tolerant the way
//! the protocol has always been: a missing `type` means `"chat"`, a missing
//! history means empty.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Envelope type string recognized for chat processing.
pub const CHAT_TYPE: &str = "chat";

/// Speaker role attached to a history entry or log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human on the other end of the connection.
    User,
    /// The text-generation backend.
    Assistant,
    /// Gateway-originated notices and session events.
    System,
}

impl Role {
    /// Label used in chat log lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// One prior turn of the conversation, supplied by the client per request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl HistoryEntry {
    /// Convenience constructor used heavily in tests.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Inbound client frame.
#[derive(Clone, Debug, Deserialize)]
pub struct ClientEnvelope {
    /// Frame type; anything other than `"chat"` is discarded upstream.
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
    /// Message text.
    #[serde(default)]
    pub message: String,
    /// Optional model selector; `None` means the configured primary model.
    #[serde(default)]
    pub model: Option<String>,
    /// Prior turns, oldest first.
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    /// Client-supplied timestamp; informational only.
    #[serde(default)]
    pub timestamp: Option<String>,
}

fn default_type() -> String {
    CHAT_TYPE.to_owned()
}

impl ClientEnvelope {
    /// Whether this frame is of the recognized chat type.
    #[must_use]
    pub fn is_chat(&self) -> bool {
        self.kind == CHAT_TYPE
    }

    /// Message text with surrounding whitespace removed.
    #[must_use]
    pub fn trimmed_message(&self) -> &str {
        self.message.trim()
    }
}

/// Outbound server frame, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Successful inference result.
    ChatResponse {
        /// Sanitized response text.
        message: String,
        /// Model that actually produced the text.
        model: String,
        /// Wall-clock seconds spent producing the response.
        response_time: f64,
        /// When the response was sent (RFC 3339).
        timestamp: String,
        /// Dedup key of the envelope this answers.
        message_hash: String,
    },
    /// Non-fatal notice (e.g. "still processing").
    System {
        /// Notice text.
        message: String,
        /// When the notice was sent (RFC 3339).
        timestamp: String,
    },
    /// Processing error surfaced to the client.
    Error {
        /// Error text.
        message: String,
        /// When the error was sent (RFC 3339).
        timestamp: String,
    },
    /// Greeting sent once after the connection is accepted.
    Connected {
        /// The connection's assigned identifier.
        connection_id: String,
        /// When the connection was accepted (RFC 3339).
        timestamp: String,
    },
}

impl ServerMessage {
    /// Build a `chat_response` frame stamped with the current time.
    #[must_use]
    pub fn chat_response(
        message: impl Into<String>,
        model: impl Into<String>,
        response_time: f64,
        message_hash: impl Into<String>,
    ) -> Self {
        Self::ChatResponse {
            message: message.into(),
            model: model.into(),
            response_time,
            timestamp: Utc::now().to_rfc3339(),
            message_hash: message_hash.into(),
        }
    }

    /// Build a `system` notice stamped with the current time.
    #[must_use]
    pub fn system(message: impl Into<String>) -> Self {
        Self::System {
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Build an `error` frame stamped with the current time.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Build the post-accept greeting frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>) -> Self {
        Self::Connected {
            connection_id: connection_id.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ClientEnvelope ───────────────────────────────────────────────────

    #[test]
    fn parse_minimal_chat() {
        let env: ClientEnvelope =
            serde_json::from_str(r#"{"type":"chat","message":"Hello"}"#).unwrap();
        assert!(env.is_chat());
        assert_eq!(env.message, "Hello");
        assert!(env.model.is_none());
        assert!(env.conversation_history.is_empty());
    }

    #[test]
    fn missing_type_defaults_to_chat() {
        let env: ClientEnvelope = serde_json::from_str(r#"{"message":"Hi"}"#).unwrap();
        assert!(env.is_chat());
    }

    #[test]
    fn non_chat_type_recognized() {
        let env: ClientEnvelope =
            serde_json::from_str(r#"{"type":"ping","message":"x"}"#).unwrap();
        assert!(!env.is_chat());
    }

    #[test]
    fn parse_with_history_and_model() {
        let env: ClientEnvelope = serde_json::from_str(
            r#"{
                "type": "chat",
                "message": "next",
                "model": "gemma3:4b",
                "conversation_history": [
                    {"role": "user", "content": "first"},
                    {"role": "assistant", "content": "reply"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(env.model.as_deref(), Some("gemma3:4b"));
        assert_eq!(env.conversation_history.len(), 2);
        assert_eq!(env.conversation_history[0].role, Role::User);
        assert_eq!(env.conversation_history[1].role, Role::Assistant);
    }

    #[test]
    fn trimmed_message_strips_whitespace() {
        let env: ClientEnvelope =
            serde_json::from_str(r#"{"message":"   spaced   "}"#).unwrap();
        assert_eq!(env.trimmed_message(), "spaced");
    }

    #[test]
    fn whitespace_only_message_trims_empty() {
        let env: ClientEnvelope = serde_json::from_str(r#"{"message":"   "}"#).unwrap();
        assert!(env.trimmed_message().is_empty());
    }

    #[test]
    fn unknown_fields_ignored() {
        let env: ClientEnvelope =
            serde_json::from_str(r#"{"message":"hi","extra":123}"#).unwrap();
        assert_eq!(env.message, "hi");
    }

    // ── ServerMessage ────────────────────────────────────────────────────

    #[test]
    fn chat_response_wire_shape() {
        let msg = ServerMessage::chat_response("answer", "gemma3:4b", 1.25, "abc123");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "chat_response");
        assert_eq!(json["message"], "answer");
        assert_eq!(json["model"], "gemma3:4b");
        assert_eq!(json["response_time"], 1.25);
        assert_eq!(json["message_hash"], "abc123");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn system_wire_shape() {
        let json = serde_json::to_value(ServerMessage::system("busy")).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["message"], "busy");
    }

    #[test]
    fn error_wire_shape() {
        let json = serde_json::to_value(ServerMessage::error("boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn connected_wire_shape() {
        let json = serde_json::to_value(ServerMessage::connected("c1")).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["connection_id"], "c1");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }
}
