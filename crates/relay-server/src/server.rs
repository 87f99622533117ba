//! `RelayServer` — Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use relay_llm::{ChatBackend, InferenceOrchestrator};
use relay_settings::RelaySettings;
use serde::Serialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::chatlog::ChatLogSink;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers and session loops.
#[derive(Clone)]
pub struct AppState {
    /// Connection membership and fan-out.
    pub registry: Arc<ConnectionRegistry>,
    /// Primary/fallback inference escalation.
    pub orchestrator: Arc<InferenceOrchestrator>,
    /// Backend handle for health probes and model listing.
    pub backend: Arc<dyn ChatBackend>,
    /// Conversation mirror.
    pub chatlog: Arc<dyn ChatLogSink>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Loaded settings.
    pub settings: Arc<RelaySettings>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus render handle; `None` disables `/metrics` (tests).
    pub metrics_handle: Option<PrometheusHandle>,
}

/// The relay gateway server.
pub struct RelayServer {
    state: AppState,
}

/// `GET /models` response body.
#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<String>,
    default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RelayServer {
    /// Create a new server around prebuilt services.
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/models", get(models_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind and serve. Port 0 auto-assigns (used by tests).
    ///
    /// Returns the bound address and the serve task handle. The server runs
    /// until the shutdown coordinator fires.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let host = self.state.settings.server.host.clone();
        let port = self.state.settings.server.port;
        let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
        let addr = listener.local_addr()?;

        let router = self.router();
        let shutdown = self.state.shutdown.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "server task ended with error");
            }
        });

        info!(%addr, "relay gateway listening");
        Ok((addr, handle))
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }
}

/// GET /ws — upgrade and hand off to the per-connection session loop.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let max_size = state.settings.server.max_message_size;
    ws.max_message_size(max_size)
        .on_upgrade(move |socket| run_session(socket, addr.to_string(), state))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = state.backend.is_reachable().await;
    let connections = state.registry.connection_count();
    Json(health::health_check(state.start_time, reachable, connections))
}

/// GET /models
async fn models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    let default = state.settings.backend.primary_model.clone();
    match state.backend.list_models().await {
        Ok(models) => Json(ModelsResponse {
            models,
            default,
            error: None,
        }),
        Err(e) => Json(ModelsResponse {
            models: Vec::new(),
            default,
            error: Some(format!("could not list backend models: {e}")),
        }),
    }
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics_handle {
        Some(handle) => crate::metrics::render(&handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::NoopChatLogSink;
    use axum::body::Body;
    use axum::http::Request;
    use relay_llm::{OllamaBackend, ResponseSanitizer};
    use tower::ServiceExt;

    fn make_state(base_url: &str) -> AppState {
        let settings = Arc::new(RelaySettings {
            backend: relay_settings::BackendSettings {
                base_url: base_url.to_owned(),
                ..relay_settings::BackendSettings::default()
            },
            ..RelaySettings::default()
        });
        let backend: Arc<dyn ChatBackend> = Arc::new(OllamaBackend::new(base_url));
        let orchestrator = Arc::new(InferenceOrchestrator::new(
            backend.clone(),
            ResponseSanitizer::passthrough(),
            settings.backend.clone(),
            settings.context.clone(),
        ));
        AppState {
            registry: Arc::new(ConnectionRegistry::new()),
            orchestrator,
            backend,
            chatlog: Arc::new(NoopChatLogSink),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            settings,
            start_time: Instant::now(),
            metrics_handle: None,
        }
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_disconnected_backend() {
        // Nothing listens on this port.
        let server = RelayServer::new(make_state("http://127.0.0.1:1"));
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["ollama"], "disconnected");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn health_reports_connected_backend() {
        let mock = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/tags"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({})),
            )
            .mount(&mock)
            .await;

        let server = RelayServer::new(make_state(&mock.uri()));
        let (status, body) = get_json(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ollama"], "connected");
    }

    #[tokio::test]
    async fn models_lists_backend_models() {
        let mock = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/tags"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"models": [{"name": "gemma3:4b"}]}),
            ))
            .mount(&mock)
            .await;

        let server = RelayServer::new(make_state(&mock.uri()));
        let (status, body) = get_json(server.router(), "/models").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["models"][0], "gemma3:4b");
        assert_eq!(body["default"], RelaySettings::default().backend.primary_model);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn models_reports_error_when_backend_down() {
        let server = RelayServer::new(make_state("http://127.0.0.1:1"));
        let (status, body) = get_json(server.router(), "/models").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["models"].as_array().unwrap().is_empty());
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn metrics_disabled_returns_404() {
        let server = RelayServer::new(make_state("http://127.0.0.1:1"));
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = RelayServer::new(make_state("http://127.0.0.1:1"));
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/nonexistent").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn shutdown_accessible_and_idempotent() {
        let server = RelayServer::new(make_state("http://127.0.0.1:1"));
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }
}
