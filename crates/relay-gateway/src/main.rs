//! # relay-gateway
//!
//! Gateway server binary — wires together all crates and starts the
//! HTTP/WebSocket server.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_llm::{ChatBackend, InferenceOrchestrator, OllamaBackend, ResponseSanitizer};
use relay_server::chatlog::{ChatLogSink, FileChatLogSink, NoopChatLogSink};
use relay_server::server::{AppState, RelayServer};
use relay_server::shutdown::ShutdownCoordinator;
use relay_server::websocket::registry::ConnectionRegistry;

/// Relay gateway server.
#[derive(Parser, Debug)]
#[command(name = "relay-gateway", about = "Real-time chat relay gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file (default `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Backend base URL (overrides settings).
    #[arg(long)]
    backend_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings_path = args
        .settings
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&settings_path)
        .context("Failed to load settings")?;

    // CLI flags override file and environment.
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(url) = args.backend_url {
        settings.backend.base_url = url;
    }
    let settings = Arc::new(settings);

    // Explicit service instances, passed by handle — no process-wide globals.
    let backend: Arc<dyn ChatBackend> =
        Arc::new(OllamaBackend::new(settings.backend.base_url.clone()));
    let sanitizer = ResponseSanitizer::new(&settings.sanitizer.risk_rules)
        .context("Failed to compile sanitizer risk rules")?;
    let orchestrator = Arc::new(InferenceOrchestrator::new(
        backend.clone(),
        sanitizer,
        settings.backend.clone(),
        settings.context.clone(),
    ));
    let chatlog: Arc<dyn ChatLogSink> = if settings.log.enabled {
        Arc::new(FileChatLogSink::new(settings.log.dir.clone()))
    } else {
        Arc::new(NoopChatLogSink)
    };

    let metrics_handle = relay_server::metrics::install_recorder();

    let state = AppState {
        registry: Arc::new(ConnectionRegistry::new()),
        orchestrator,
        backend: backend.clone(),
        chatlog,
        shutdown: Arc::new(ShutdownCoordinator::new()),
        settings: settings.clone(),
        start_time: std::time::Instant::now(),
        metrics_handle: Some(metrics_handle),
    };
    let server = RelayServer::new(state);

    if backend.is_reachable().await {
        tracing::info!(
            backend = %settings.backend.base_url,
            primary = %settings.backend.primary_model,
            fallback = %settings.backend.fallback_model,
            "backend reachable"
        );
    } else {
        tracing::warn!(
            backend = %settings.backend.base_url,
            "backend not reachable at startup — requests will fail over until it comes up"
        );
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!("relay gateway listening on http://{addr} (ws://{addr}/ws)");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().shutdown();
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults_to_no_overrides() {
        let cli = Cli::parse_from(["relay-gateway"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.settings.is_none());
        assert!(cli.backend_url.is_none());
    }

    #[test]
    fn cli_custom_host_and_port() {
        let cli = Cli::parse_from(["relay-gateway", "--host", "127.0.0.1", "--port", "9000"]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn cli_settings_path() {
        let cli = Cli::parse_from(["relay-gateway", "--settings", "/tmp/custom.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/custom.json")));
    }

    #[test]
    fn cli_backend_url() {
        let cli = Cli::parse_from(["relay-gateway", "--backend-url", "http://10.0.0.2:11434"]);
        assert_eq!(cli.backend_url.as_deref(), Some("http://10.0.0.2:11434"));
    }
}
