//! # Prompt Composition
//!
//! Builds the prompt sent upstream from a bounded view of the client-supplied
//! conversation history plus a fixed safety preamble. The fallback prompt is
//! deliberately context-free: when the primary path has already failed, the
//! fallback optimizes for safety over continuity.

use relay_core::envelope::{HistoryEntry, Role};
use relay_settings::ContextSettings;

/// Fixed preamble ahead of every primary prompt.
const SAFETY_PREAMBLE: &str = "You are an assistant that puts accuracy first.\n\n\
Response principles:\n\
1. Never present fabricated or unverifiable information as fact.\n\
2. Clearly distinguish fact from opinion.\n\n";

/// Fixed instruction for fallback prompts.
const FALLBACK_INSTRUCTION: &str = "Provide only information you are certain is accurate. \
If you are not sure, answer \"I don't know\" rather than guessing.\n\n";

/// A bounded, deduplicated view over the supplied conversation history.
#[derive(Clone, Debug, Default)]
pub struct ContextWindow {
    entries: Vec<HistoryEntry>,
}

impl ContextWindow {
    /// Build the window from client-supplied history.
    ///
    /// Scans the most recent `scan_window` entries newest-first, keeping
    /// entries whose trimmed content is non-empty and not seen before, up to
    /// `max_entries`. The kept entries are returned in chronological order
    /// with each content capped at `max_entry_chars` characters.
    #[must_use]
    pub fn from_history(history: &[HistoryEntry], settings: &ContextSettings) -> Self {
        let start = history.len().saturating_sub(settings.scan_window);
        let mut seen: Vec<&str> = Vec::new();
        let mut kept: Vec<&HistoryEntry> = Vec::new();

        for entry in history[start..].iter().rev() {
            let trimmed = entry.content.trim();
            if trimmed.is_empty() || seen.contains(&trimmed) {
                continue;
            }
            seen.push(trimmed);
            kept.push(entry);
            if kept.len() >= settings.max_entries {
                break;
            }
        }

        // Back to chronological order, with per-entry caps applied.
        let entries = kept
            .into_iter()
            .rev()
            .map(|e| HistoryEntry {
                role: e.role,
                content: cap_chars(&e.content, settings.max_entry_chars),
            })
            .collect();

        Self { entries }
    }

    /// Whether the window kept any entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The kept entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Render the "previous conversation" block, or an empty string.
    #[must_use]
    fn render(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut block = String::from("Previous conversation:\n");
        for entry in &self.entries {
            let speaker = match entry.role {
                Role::User => "User",
                Role::Assistant | Role::System => "Assistant",
            };
            block.push_str(speaker);
            block.push_str(": ");
            block.push_str(&entry.content);
            block.push('\n');
        }
        block.push_str("\nFocus on the current question.\n\n");
        block
    }
}

/// Cap a string at `max` characters on a char boundary.
fn cap_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        s.chars().take(max).collect()
    }
}

/// Compose the primary prompt: preamble, bounded context, question frame.
#[must_use]
pub fn compose_primary_prompt(window: &ContextWindow, message: &str) -> String {
    format!(
        "{SAFETY_PREAMBLE}{}Question: {message}\n\nAccurate answer:",
        window.render()
    )
}

/// Compose the fallback prompt: stricter instruction, no context.
#[must_use]
pub fn compose_fallback_prompt(message: &str) -> String {
    format!("{FALLBACK_INSTRUCTION}Question: {message}\n\nAnswer:")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
