//! Registry of open push-channel sockets.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use sculpt_core::types::{TaskId, Timestamp};
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing control frames to a connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single push-channel connection.
pub struct WsConnection {
    /// Task whose progress this connection follows.
    pub task_id: TaskId,
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Tracks every open push-channel connection.
///
/// Progress updates flow to each connection through its own broadcaster
/// subscription; the manager only carries connection-wide frames
/// (heartbeat pings, shutdown closes).
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the control channel so the caller can
    /// forward frames to the WebSocket sink.
    pub async fn add(&self, conn_id: String, task_id: TaskId) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            task_id,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Connections currently following `task_id`.
    pub async fn watchers(&self, task_id: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.task_id == task_id)
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close every socket and forget it.
    pub async fn shutdown_all(&self) {
        let drained: Vec<_> = self.connections.write().await.drain().collect();
        for (conn_id, conn) in &drained {
            if conn.sender.send(Message::Close(None)).is_err() {
                tracing::debug!(conn_id = %conn_id, task_id = %conn.task_id, "Push connection already gone");
            }
        }
        tracing::info!(count = drained.len(), "Closed all push connections");
    }

    /// Send a Ping frame to every connected client.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
