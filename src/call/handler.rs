//! Per-connection message handling
//!
//! Each accepted WebSocket gets one read loop here. Incoming messages are
//! dispatched by their `type` discriminator against the shared [`CallHub`];
//! outbound traffic goes through a per-connection mpsc channel drained by a
//! dedicated writer task, so any component can address a participant without
//! touching the socket itself.
//!
//! A failure while processing one message never closes the channel or stops
//! the loop — the message is logged and dropped, and the next one is read.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::call::matcher::Matcher;
use crate::call::protocol::{ClientMessage, Role, ServerMessage};
use crate::call::queue::WaitingQueue;
use crate::call::registry::{ConnectionId, ConnectionRegistry, PeerSender};
use crate::call::session::{SessionState, SessionTable};
use crate::directory::Directory;

/// WebSocket type after upgrade
pub type HyperWebSocket =
    hyper_tungstenite::WebSocketStream<hyper_util::rt::TokioIo<hyper::upgrade::Upgraded>>;

/// Shared call-handling state: registry, backlog, sessions, matcher
pub struct CallHub {
    pub registry: Arc<ConnectionRegistry>,
    pub queue: Arc<WaitingQueue>,
    pub sessions: Arc<SessionTable>,
    pub directory: Arc<dyn Directory>,
    matcher: Matcher,
}

impl CallHub {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let queue = Arc::new(WaitingQueue::new());
        let sessions = Arc::new(SessionTable::new());
        let matcher = Matcher::new(
            Arc::clone(&directory),
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&sessions),
        );
        Self {
            registry,
            queue,
            sessions,
            directory,
            matcher,
        }
    }

    /// Dispatch one raw message from a connection
    pub async fn dispatch(&self, sender: &PeerSender, raw: &str) {
        let msg: ClientMessage = match serde_json::from_str(raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "malformed message dropped");
                return;
            }
        };

        match msg {
            ClientMessage::StoreUser { name, role } => {
                self.registry.register(&name, sender.clone());
                info!(user = %name, role = ?role, "participant registered");

                if role == Role::Agent {
                    match self.directory.set_online_available(&name, true, true).await {
                        Ok(()) => {
                            // New capacity in the pool; give the backlog a chance
                            self.matcher.drain_waiting().await;
                        }
                        Err(e) => {
                            warn!(agent = %name, error = %e, "agent presence update failed");
                        }
                    }
                }
            }

            ClientMessage::RequestKycCall { user_id } => {
                self.matcher.request_call(&user_id, sender).await;
            }

            ClientMessage::CreateOffer { ref target }
            | ClientMessage::CreateAnswer { ref target } => {
                if self.relay(target, raw) {
                    // First negotiation payload: the pairing is now in call
                    if let Some(session) = self.sessions.find_by_participant(target) {
                        if session.state == SessionState::Assigned {
                            self.sessions.mark_in_call(session.id);
                        }
                    }
                }
            }

            ClientMessage::IceCandidate { ref target } => {
                self.relay(target, raw);
            }

            ClientMessage::KycStatusUpdate {
                status,
                member_id,
                agent_id,
                user_name,
            } => {
                match self
                    .directory
                    .record_case_outcome(member_id, &status, &agent_id)
                    .await
                {
                    Ok(()) => {
                        info!(case = member_id, status = %status, "case outcome recorded");
                        if let Some(member_conn) = self.registry.lookup(&user_name) {
                            member_conn.send(&ServerMessage::KycResult { status });
                        }
                    }
                    Err(e) => {
                        // Best-effort operation: log only, the operator can resend
                        warn!(case = member_id, error = %e, "case outcome write failed");
                    }
                }
            }

            ClientMessage::CallEnded { agent_name, target } => {
                // Persist the availability restore before touching in-memory
                // state; if the write fails the call is left open and the
                // agent retries.
                match self.directory.set_available(&agent_name, true).await {
                    Ok(()) => {
                        if let Some(session) = self.sessions.find_by_participant(&agent_name) {
                            self.sessions.end(session.id);
                        }
                        if let Some(member_conn) = self.registry.lookup(&target) {
                            member_conn.send(&ServerMessage::CallEnded);
                        }
                        info!(agent = %agent_name, member = %target, "call ended");
                        self.matcher.drain_waiting().await;
                    }
                    Err(e) => {
                        warn!(agent = %agent_name, error = %e, "availability restore failed, call left open");
                    }
                }
            }
        }
    }

    /// Forward raw message text to a target identity. Absent targets are
    /// dropped silently — peers disappear mid-negotiation and WebRTC retries
    /// at the application layer.
    fn relay(&self, target: &str, raw: &str) -> bool {
        match self.registry.lookup(target) {
            Some(peer) => {
                peer.send_raw(raw);
                true
            }
            None => {
                debug!(target = %target, "relay target not connected, dropped");
                false
            }
        }
    }

    /// Reconcile state after a connection closes.
    ///
    /// Removes the registry entry (unless a reconnect already replaced it),
    /// marks the identity offline in the directory ("not found" is the normal
    /// case for members), ends any session the identity was part of and
    /// notifies the surviving peer. When the member is the one who left, the
    /// surviving agent goes back into the pool.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let Some(identity) = self.registry.remove_by_connection(conn_id) else {
            debug!("closed connection had no registry entry");
            return;
        };

        info!(user = %identity, "disconnected");

        self.queue.remove(&identity);

        if let Err(e) = self
            .directory
            .set_online_available(&identity, false, false)
            .await
        {
            warn!(user = %identity, error = %e, "presence update on disconnect failed");
        }

        let Some(session) = self.sessions.find_by_participant(&identity) else {
            return;
        };
        let Some(ended) = self.sessions.end(session.id) else {
            return;
        };

        let peer = if ended.member == identity {
            ended.agent.clone()
        } else {
            ended.member.clone()
        };

        if let Some(peer_conn) = self.registry.lookup(&peer) {
            peer_conn.send(&ServerMessage::CallEnded);
        }

        info!(session = %ended.id, user = %identity, peer = %peer, "session ended by disconnect");

        if ended.member == identity {
            // The agent is still online; return it to the pool
            match self.directory.set_available(&ended.agent, true).await {
                Ok(()) => self.matcher.drain_waiting().await,
                Err(e) => {
                    warn!(agent = %ended.agent, error = %e, "availability restore on member disconnect failed");
                }
            }
        }
    }
}

/// Run the read loop for one established WebSocket connection
pub async fn handle_connection(hub: Arc<CallHub>, ws: HyperWebSocket) {
    let (mut write, mut read) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Writer task: drains the outbound channel into the sink and closes the
    // socket once every sender is gone.
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(msg).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    let conn_id = Uuid::new_v4();
    let sender = PeerSender::new(conn_id, tx.clone());

    debug!(conn = %conn_id, "connection open");

    while let Some(result) = read.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn = %conn_id, error = %e, "read error, closing");
                break;
            }
        };

        match msg {
            Message::Text(text) => hub.dispatch(&sender, &text).await,
            Message::Ping(payload) => {
                let _ = tx.send(Message::Pong(payload));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.disconnect(conn_id).await;

    // Drop our senders so the writer drains and closes the socket
    drop(sender);
    drop(tx);
    let _ = writer.await;
}
