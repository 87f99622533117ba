//! Chat log sink.
//!
//! Conversations are mirrored to an external sink for operators; nothing in
//! message processing depends on the sink succeeding or on its storage
//! format. The file implementation writes one append-only text file per
//! (day, client address). Every failure is swallowed with a `warn!` — a
//! full disk must never break chat.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use relay_core::envelope::Role;
use tracing::warn;

/// Fire-and-forget conversation mirror.
pub trait ChatLogSink: Send + Sync {
    /// Record one message.
    fn log_message(
        &self,
        client: &str,
        role: Role,
        content: &str,
        response_time: Option<f64>,
        model: Option<&str>,
    );

    /// Record a session lifecycle event (connect, disconnect, errors).
    fn log_session_event(&self, client: &str, event: &str) {
        self.log_message(client, Role::System, event, None, None);
    }
}

/// Sink that discards everything; used in tests and when logging is disabled.
pub struct NoopChatLogSink;

impl ChatLogSink for NoopChatLogSink {
    fn log_message(&self, _: &str, _: Role, _: &str, _: Option<f64>, _: Option<&str>) {}
}

/// Append-only per-day, per-client text files.
pub struct FileChatLogSink {
    dir: PathBuf,
}

impl FileChatLogSink {
    /// Create a sink rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "failed to create chat log directory");
        }
        Self { dir }
    }

    /// Log file path for a client today: `YYYY-MM-DD_<client>.txt`.
    fn file_path(&self, client: &str) -> PathBuf {
        let date = Local::now().format("%Y-%m-%d");
        let clean: String = client
            .chars()
            .map(|c| if c == '.' || c == ':' { '_' } else { c })
            .collect();
        self.dir.join(format!("{date}_{clean}.txt"))
    }

    fn write(&self, path: &Path, client: &str, line: &str) -> std::io::Result<()> {
        let is_new = !path.exists();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        if is_new {
            writeln!(file, "=== Relay Gateway Chat Log ===")?;
            writeln!(file, "Date: {}", Local::now().format("%Y-%m-%d"))?;
            writeln!(file, "Client: {client}")?;
            writeln!(file, "{}", "=".repeat(50))?;
            writeln!(file)?;
        }
        file.write_all(line.as_bytes())
    }
}

impl ChatLogSink for FileChatLogSink {
    fn log_message(
        &self,
        client: &str,
        role: Role,
        content: &str,
        response_time: Option<f64>,
        model: Option<&str>,
    ) {
        let path = self.file_path(client);
        let timestamp = Local::now().format("%H:%M:%S");

        let mut line = format!("[{timestamp}] {}: {content}\n", role.as_str());
        if let Some(secs) = response_time {
            line.push_str(&format!("    (response time: {secs:.2}s)\n"));
        }
        if let (Some(model), Role::Assistant) = (model, role) {
            line.push_str(&format!("    (model: {model})\n"));
        }
        line.push('\n');

        if let Err(e) = self.write(&path, client, &line) {
            warn!(path = %path.display(), error = %e, "failed to write chat log");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
