use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::events::ServerEvent;

/// Opaque id assigned to a connection when it joins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outbound half of one connected session
struct ClientHandle {
    tx: UnboundedSender<ServerEvent>,
    connected_at: DateTime<Utc>,
}

/// Thread-safe session registry
pub struct ClientManager {
    clients: Arc<Mutex<HashMap<SessionId, ClientHandle>>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Add a session; the receiver yields every event queued for it.
    pub async fn register(&self) -> (SessionId, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = SessionId::new();

        let mut clients = self.clients.lock().await;
        clients.insert(
            id,
            ClientHandle {
                tx,
                connected_at: Utc::now(),
            },
        );
        tracing::info!("Client {} connected. Total clients: {}", id, clients.len());

        (id, rx)
    }

    /// Remove a session. Returns false if it was already gone.
    pub async fn unregister(&self, id: SessionId) -> bool {
        let mut clients = self.clients.lock().await;
        match clients.remove(&id) {
            Some(handle) => {
                let connected_for = Utc::now() - handle.connected_at;
                tracing::info!(
                    "Client {} disconnected after {}s. Remaining: {}",
                    id,
                    connected_for.num_seconds(),
                    clients.len()
                );
                true
            }
            None => false,
        }
    }

    /// Queue an event for a single session
    pub async fn send_to(&self, id: SessionId, event: ServerEvent) -> Result<()> {
        let clients = self.clients.lock().await;
        let handle = clients.get(&id).ok_or(GatewayError::SessionClosed(id))?;
        handle
            .tx
            .send(event)
            .map_err(|_| GatewayError::SessionClosed(id))
    }

    /// Queue an event for every session, removing dead ones.
    ///
    /// Returns the number of sessions the event was queued for. A failure
    /// on one session never affects the others.
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        let mut clients = self.clients.lock().await;
        let mut dead = Vec::new();

        for (id, handle) in clients.iter() {
            if handle.tx.send(event.clone()).is_err() {
                tracing::warn!("Failed to queue {} for client {}", event.name(), id);
                dead.push(*id);
            }
        }

        for id in &dead {
            clients.remove(id);
            tracing::info!("Removed dead client {}. Remaining: {}", id, clients.len());
        }

        clients.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        self.clients.lock().await.keys().copied().collect()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
