//! Connection registry
//!
//! Maps a participant identity to the outbound half of its live WebSocket.
//! Registration replaces any previous entry for the same identity — last
//! writer wins, which is what lets a participant reconnect under the same
//! name without an explicit deregistration step.
//!
//! At disconnect time the only handle the closing task has is its own
//! connection id, so removal is keyed by connection rather than identity,
//! and a stale close must never evict a newer connection that has since
//! taken over the name.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use uuid::Uuid;

use crate::call::protocol::ServerMessage;

/// Process-unique id for one WebSocket connection
pub type ConnectionId = Uuid;

/// Outbound handle to one participant's connection.
///
/// Sends are fire-and-forget: a send to a connection whose writer task has
/// already gone away is silently dropped, the same as a missing registry
/// entry.
#[derive(Clone)]
pub struct PeerSender {
    conn_id: ConnectionId,
    tx: mpsc::UnboundedSender<Message>,
}

impl PeerSender {
    pub fn new(conn_id: ConnectionId, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { conn_id, tx }
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Send a structured notification
    pub fn send(&self, msg: &ServerMessage) {
        self.send_raw(msg.to_json());
    }

    /// Send pre-serialized message text verbatim
    pub fn send_raw(&self, text: impl Into<String>) {
        if self.tx.send(Message::Text(text.into())).is_err() {
            debug!("send to closed connection dropped");
        }
    }
}

/// Live-connection registry, identity → outbound channel
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, PeerSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under an identity.
    ///
    /// An existing entry for the same identity is replaced and its old
    /// connection silently loses reachability (reconnect support).
    pub fn register(&self, identity: &str, sender: PeerSender) {
        if self
            .connections
            .insert(identity.to_string(), sender)
            .is_some()
        {
            debug!(identity = %identity, "registry entry replaced by newer connection");
        }
    }

    /// Look up the outbound handle for an identity
    pub fn lookup(&self, identity: &str) -> Option<PeerSender> {
        self.connections.get(identity).map(|entry| entry.clone())
    }

    /// Remove the entry belonging to a closing connection and return its
    /// identity. Returns `None` when the connection never registered or its
    /// entry has since been replaced by a reconnect.
    pub fn remove_by_connection(&self, conn_id: ConnectionId) -> Option<String> {
        let identity = self
            .connections
            .iter()
            .find(|entry| entry.value().conn_id == conn_id)
            .map(|entry| entry.key().clone())?;

        // Re-check under the entry lock so a racing reconnect is not evicted
        self.connections
            .remove_if(&identity, |_, sender| sender.conn_id == conn_id)
            .map(|(identity, _)| identity)
    }

    /// Number of live registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
