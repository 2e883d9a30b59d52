use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// A live WebSocket client.
#[derive(Debug)]
pub struct LiveConnection {
    /// Transport-assigned connection identifier.
    pub id: Uuid,
    /// The session this connection is authorized for.
    pub session_id: Uuid,
    /// Sender feeding the connection's WebSocket writer task.
    pub tx: mpsc::UnboundedSender<String>,
}

/// In-memory registry of live connections.
///
/// Holds only the relay handles; the durable connection-to-session
/// bindings live in the connection store.
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, LiveConnection>>,
}

impl ConnectionManager {
    /// Creates an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: RwLock::new(HashMap::new()),
        })
    }

    /// Registers a live connection.
    pub async fn register(&self, conn: LiveConnection) {
        let id = conn.id;
        let _ = self.connections.write().await.insert(id, conn);
        tracing::debug!(connection_id = %id, "Live connection registered");
    }

    /// Removes a live connection. Idempotent.
    pub async fn deregister(&self, id: Uuid) {
        let _ = self.connections.write().await.remove(&id);
        tracing::debug!(connection_id = %id, "Live connection deregistered");
    }

    /// Returns the relay sender for a connection, if it is live.
    pub async fn sender(&self, id: Uuid) -> Option<mpsc::UnboundedSender<String>> {
        self.connections.read().await.get(&id).map(|c| c.tx.clone())
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
