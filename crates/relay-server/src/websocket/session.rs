//! Per-connection session loop — handles a single connected client from
//! upgrade through disconnect.
//!
//! The loop owns the session's [`SessionState`] outright. Accepted envelopes
//! run in a spawned inference task so the loop stays responsive (that is what
//! makes the busy notice observable); a completion channel flips the state
//! back to `Idle` when the task finishes, delivered or not. Backend calls are
//! never cancelled by disconnect — a task whose client vanished finishes,
//! fails to enqueue its result, and that is the end of it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use relay_core::envelope::{ClientEnvelope, Role, ServerMessage};
use relay_core::ids::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::server::AppState;
use crate::websocket::connection::ClientConnection;
use crate::websocket::state::{Admission, DiscardReason, SessionState};

/// Notice sent when a chat envelope arrives while the session is busy.
pub const BUSY_NOTICE: &str = "Still processing your previous message. Please wait a moment.";

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and sends a `connected` greeting
/// 2. Admits incoming envelopes through the session state machine
/// 3. Runs accepted envelopes through the orchestrator in a spawned task
/// 4. Sends periodic Ping frames and disconnects unresponsive clients
/// 5. Unregisters exactly once on disconnect
#[instrument(skip_all, fields(addr = %addr))]
pub async fn run_session(ws: WebSocket, addr: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(256);
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), addr.clone(), send_tx));
    let conn_id = connection.id.clone();

    let connection_start = std::time::Instant::now();
    info!(conn_id = %conn_id, "client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    state.registry.register(connection.clone()).await;
    state.chatlog.log_session_event(&addr, "WebSocket session started");

    // Greeting frame, sent directly before the forwarder takes over.
    if let Ok(json) = serde_json::to_string(&ServerMessage::connected(conn_id.as_str())) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let ping_interval = Duration::from_secs(state.settings.server.heartbeat_interval_secs);
    let pong_timeout = Duration::from_secs(state.settings.server.heartbeat_timeout_secs);
    let outbound_conn = connection.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_timer = tokio::time::interval(ping_interval);
        // Skip the immediate first tick
        let _ = ping_timer.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_timer.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > pong_timeout
                    {
                        warn!("client unresponsive for {pong_timeout:?}, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Completion notifications from spawned inference tasks.
    let (done_tx, mut done_rx) = mpsc::channel::<()>(8);
    let mut session = SessionState::new();

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                let text = match inbound {
                    Some(Ok(Message::Text(t))) => t.to_string(),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(s) => s,
                        Err(_) => {
                            debug!(conn_id = %conn_id, "ignoring non-UTF8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) => {
                        info!(conn_id = %conn_id, "client sent close frame");
                        break;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        connection.mark_alive();
                        continue;
                    }
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "websocket receive error");
                        break;
                    }
                    None => break,
                };
                connection.mark_alive();
                handle_frame(&text, &mut session, &connection, &state, &done_tx);
            }
            _ = done_rx.recv() => {
                // Unconditional: the result may not have been deliverable,
                // but the session must be able to accept the next message.
                session.complete();
            }
        }
    }

    // Clean up — unregister exactly once, whatever ended the loop.
    info!(conn_id = %conn_id, "client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection_start.elapsed().as_secs_f64());
    outbound.abort();
    state.registry.unregister(&conn_id).await;
    state.chatlog.log_session_event(&addr, "WebSocket session ended");
}

/// Parse one text frame and drive it through admission.
fn handle_frame(
    text: &str,
    session: &mut SessionState,
    connection: &Arc<ClientConnection>,
    state: &AppState,
    done_tx: &mpsc::Sender<()>,
) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            warn!(conn_id = %connection.id, error = %e, "invalid JSON frame");
            let _ = connection.send_message(&ServerMessage::error(format!(
                "Could not parse message: {e}"
            )));
            return;
        }
    };

    match session.admit(envelope, Utc::now()) {
        Admission::Discard(DiscardReason::UnknownType) => {
            debug!(conn_id = %connection.id, "discarding envelope of unknown type");
        }
        Admission::Discard(DiscardReason::EmptyMessage) => {
            // Silent by contract: no response, no log entry.
        }
        Admission::Discard(DiscardReason::Duplicate) => {
            warn!(conn_id = %connection.id, "duplicate message ignored");
            counter!("session_duplicates_total").increment(1);
        }
        Admission::RejectBusy => {
            debug!(conn_id = %connection.id, "busy, rejecting envelope");
            counter!("session_busy_rejections_total").increment(1);
            let _ = connection.send_message(&ServerMessage::system(BUSY_NOTICE));
        }
        Admission::Accept(accepted) => {
            spawn_inference(*accepted, connection, state, done_tx);
        }
    }
}

/// Run one accepted message through the orchestrator off the receive loop.
fn spawn_inference(
    accepted: crate::websocket::state::AcceptedMessage,
    connection: &Arc<ClientConnection>,
    state: &AppState,
    done_tx: &mpsc::Sender<()>,
) {
    let orchestrator = state.orchestrator.clone();
    let registry = state.registry.clone();
    let chatlog = state.chatlog.clone();
    let conn_id = connection.id.clone();
    let addr = connection.addr.clone();
    let done_tx = done_tx.clone();

    debug!(conn_id = %conn_id, "message accepted, starting inference");
    drop(tokio::spawn(async move {
        chatlog.log_message(&addr, Role::User, &accepted.message, None, None);

        let result = orchestrator
            .run(&accepted.message, accepted.model.as_deref(), &accepted.history)
            .await;

        if let Some(err) = &result.error {
            error!(conn_id = %conn_id, error = %err, "inference exhausted both backends");
            chatlog.log_session_event(&addr, &format!("inference failed: {err}"));
        }
        chatlog.log_message(
            &addr,
            Role::Assistant,
            &result.text,
            Some(result.elapsed_seconds),
            Some(&result.model),
        );

        counter!("chat_responses_total", "backend" => result.backend_used.as_str()).increment(1);
        let frame = ServerMessage::chat_response(
            result.text,
            result.model,
            result.elapsed_seconds,
            accepted.key.as_str(),
        );
        if !registry.send(&conn_id, &frame).await {
            // Client is gone or hopelessly backed up. Logged, not retried;
            // unregister is idempotent with the receive loop's own cleanup.
            info!(conn_id = %conn_id, "could not deliver chat response");
            registry.unregister(&conn_id).await;
        }

        // Always flip back to Idle, even when delivery failed. The receiver
        // being gone just means nobody is left to care.
        let _ = done_tx.send(()).await;
    }));
}

#[cfg(test)]
mod tests {
    // The receive loop needs a live WebSocket on both ends and is covered by
    // tests/integration.rs. Unit tests here pin the frame constants.

    use super::*;

    #[test]
    fn busy_notice_wording() {
        assert!(BUSY_NOTICE.contains("Still processing"));
    }

    #[test]
    fn greeting_frame_shape() {
        let json =
            serde_json::to_value(ServerMessage::connected("conn_1")).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["connection_id"], "conn_1");
        assert!(json["timestamp"].is_string());
    }
}
