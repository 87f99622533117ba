//! Per-session admission state machine.
//!
//! Each connection owns exactly one [`SessionState`], mutated only by that
//! connection's receive loop — which is why none of these fields need locks.
//! The machine cycles `Idle → Busy → Idle` for the life of the connection
//! and decides, for every inbound envelope, whether it reaches the
//! orchestrator at all.

use chrono::{DateTime, Utc};
use relay_core::dedup::DedupKey;
use relay_core::envelope::{ClientEnvelope, HistoryEntry};

/// Processing phase of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// Ready to accept the next chat envelope.
    #[default]
    Idle,
    /// An inference is in flight; new chat envelopes are rejected.
    Busy,
}

/// Why an envelope was silently dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    /// Envelope type is not the recognized chat type.
    UnknownType,
    /// Message was empty after trimming.
    EmptyMessage,
    /// Dedup key matched the session's last accepted key.
    Duplicate,
}

/// An envelope that passed admission and owns everything inference needs.
#[derive(Clone, Debug)]
pub struct AcceptedMessage {
    /// Trimmed message text.
    pub message: String,
    /// Optional model override.
    pub model: Option<String>,
    /// Conversation history as supplied by the client.
    pub history: Vec<HistoryEntry>,
    /// The envelope's dedup key, echoed back as `message_hash`.
    pub key: DedupKey,
}

/// Admission verdict for one inbound envelope.
#[derive(Clone, Debug)]
pub enum Admission {
    /// Drop silently; the loop keeps waiting.
    Discard(DiscardReason),
    /// Session is busy; the loop sends a "still processing" notice.
    RejectBusy,
    /// Hand to the orchestrator; the session is now `Busy`.
    Accept(Box<AcceptedMessage>),
}

/// Idle/Busy machine plus the last accepted dedup key.
#[derive(Debug, Default)]
pub struct SessionState {
    phase: SessionPhase,
    last_dedup_key: Option<DedupKey>,
}

impl SessionState {
    /// Fresh session in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Whether an inference is currently in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.phase == SessionPhase::Busy
    }

    /// Run the admission ladder for one envelope.
    ///
    /// Checks in order: envelope type, empty content, busy state, dedup key.
    /// On acceptance the session transitions to `Busy` and records the key.
    pub fn admit(&mut self, envelope: ClientEnvelope, now: DateTime<Utc>) -> Admission {
        if !envelope.is_chat() {
            return Admission::Discard(DiscardReason::UnknownType);
        }

        let message = envelope.trimmed_message();
        if message.is_empty() {
            return Admission::Discard(DiscardReason::EmptyMessage);
        }

        if self.is_busy() {
            return Admission::RejectBusy;
        }

        let key = DedupKey::compute(message, now);
        if self.last_dedup_key.as_ref() == Some(&key) {
            return Admission::Discard(DiscardReason::Duplicate);
        }

        self.phase = SessionPhase::Busy;
        self.last_dedup_key = Some(key.clone());
        Admission::Accept(Box::new(AcceptedMessage {
            message: message.to_owned(),
            model: envelope.model,
            history: envelope.conversation_history,
            key,
        }))
    }

    /// Return to `Idle`, unconditionally.
    ///
    /// Called when the in-flight inference finishes, whether or not the
    /// result could be delivered.
    pub fn complete(&mut self) {
        self.phase = SessionPhase::Idle;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
