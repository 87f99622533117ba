//! Connection membership and message fan-out.
//!
//! The registry is the only state shared across connections. Mutation goes
//! through an async `RwLock`; the count is kept in a relaxed atomic so the
//! health endpoint never takes the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::counter;
use relay_core::envelope::ServerMessage;
use relay_core::ids::ConnectionId;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;

/// Maximum total lifetime message drops before forcibly unregistering a slow client.
const MAX_TOTAL_DROPS: u64 = 100;

/// Tracks all open connections and provides addressed send and broadcast.
pub struct ConnectionRegistry {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Atomic counter tracking total connections (avoids read-locking for count queries).
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub async fn register(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection by ID. Safe to call repeatedly; extra calls are no-ops.
    pub async fn unregister(&self, connection_id: &ConnectionId) {
        let mut conns = self.connections.write().await;
        if conns.remove(connection_id).is_some() {
            let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            debug!(conn_id = %connection_id, "connection unregistered");
        }
    }

    /// Best-effort addressed send.
    ///
    /// Returns `false` when the connection is unknown or its channel is
    /// full/closed. Transport trouble never propagates past this boundary;
    /// the failure is logged and the caller may unregister.
    pub async fn send(&self, connection_id: &ConnectionId, message: &ServerMessage) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize server message");
                return false;
            }
        };
        let conns = self.connections.read().await;
        match conns.get(connection_id) {
            Some(conn) => {
                let sent = conn.send(json);
                if !sent {
                    counter!("ws_send_drops_total").increment(1);
                    warn!(conn_id = %connection_id, "failed to send message (channel full or closed)");
                }
                sent
            }
            None => {
                debug!(conn_id = %connection_id, "send to unknown connection ignored");
                false
            }
        }
    }

    /// Broadcast a frame to every connection.
    ///
    /// Iterates a membership snapshot; a failure on one connection never
    /// blocks delivery to the others. Serialization happens once and the
    /// `Arc<String>` is shared across recipients. Clients that have dropped
    /// too many messages are unregistered.
    pub async fn broadcast(&self, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(error = %e, "failed to serialize broadcast message");
                return;
            }
        };
        let mut to_remove = Vec::new();
        {
            let conns = self.connections.read().await;
            let mut recipients = 0u32;
            for conn in conns.values() {
                recipients += 1;
                if !conn.send(Arc::clone(&json)) {
                    counter!("ws_broadcast_drops_total").increment(1);
                    let drops = conn.drop_count();
                    if drops >= MAX_TOTAL_DROPS {
                        warn!(conn_id = %conn.id, drops, "disconnecting slow client");
                        to_remove.push(conn.id.clone());
                    } else {
                        warn!(conn_id = %conn.id, total_drops = drops, "failed to broadcast to client (channel full)");
                    }
                }
            }
            debug!(recipients, "broadcast frame");
        }
        if !to_remove.is_empty() {
            let mut conns = self.connections.write().await;
            for id in &to_remove {
                if conns.remove(id).is_some() {
                    let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
