//! Matcher — pairs a requesting member with an available agent
//!
//! Reservation is delegated to the directory's atomic reserve, so two
//! concurrent requests can never be handed the same agent. The directory can
//! still be stale the other way around: an agent marked available whose
//! socket is already gone. That reservation is reconciled to offline (the
//! record was wrong, not the registry) and the reserve is retried, so one
//! dead record never blocks a request while live agents remain.

use std::sync::Arc;
use tracing::{info, warn};

use crate::call::protocol::ServerMessage;
use crate::call::queue::WaitingQueue;
use crate::call::registry::{ConnectionRegistry, PeerSender};
use crate::call::session::SessionTable;
use crate::directory::Directory;

/// Pairs members with agents and maintains the waiting backlog
pub struct Matcher {
    directory: Arc<dyn Directory>,
    registry: Arc<ConnectionRegistry>,
    queue: Arc<WaitingQueue>,
    sessions: Arc<SessionTable>,
}

impl Matcher {
    pub fn new(
        directory: Arc<dyn Directory>,
        registry: Arc<ConnectionRegistry>,
        queue: Arc<WaitingQueue>,
        sessions: Arc<SessionTable>,
    ) -> Self {
        Self {
            directory,
            registry,
            queue,
            sessions,
        }
    }

    /// Handle a member's call request.
    ///
    /// Outcomes: a session in `Assigned` with both parties notified, or the
    /// member queued with a `waiting` notification. A directory failure also
    /// answers `waiting` — in-memory state is never mutated on the optimistic
    /// assumption that a failed write landed.
    pub async fn request_call(&self, member_id: &str, requester: &PeerSender) {
        loop {
            let reserved = match self.directory.reserve_available_agent().await {
                Ok(reserved) => reserved,
                Err(e) => {
                    warn!(member = %member_id, error = %e, "agent reservation failed");
                    requester.send(&ServerMessage::Waiting);
                    return;
                }
            };

            let Some(agent_id) = reserved else {
                self.queue.push(member_id);
                requester.send(&ServerMessage::Waiting);
                info!(member = %member_id, "no agent available, member queued");
                return;
            };

            let Some(agent_conn) = self.registry.lookup(&agent_id) else {
                // Stale directory record: the agent's socket is gone. Revert
                // the reservation by reconciling the record to offline, then
                // try the next candidate.
                warn!(agent = %agent_id, "reserved agent has no live connection, reconciling");
                if let Err(e) = self
                    .directory
                    .set_online_available(&agent_id, false, false)
                    .await
                {
                    warn!(agent = %agent_id, error = %e, "stale agent reconciliation failed");
                    requester.send(&ServerMessage::Waiting);
                    return;
                }
                continue;
            };

            let session = self.sessions.create(member_id, &agent_id);

            agent_conn.send(&ServerMessage::IncomingCall {
                user_id: member_id.to_string(),
            });
            requester.send(&ServerMessage::AgentAssigned {
                agent_name: agent_id.clone(),
            });

            info!(
                session = %session.id,
                member = %member_id,
                agent = %agent_id,
                "call assigned"
            );
            return;
        }
    }

    /// Re-attempt matching for the oldest waiting member.
    ///
    /// Called on every transition that returns an agent to the pool (agent
    /// registration, call end). Members who disconnected while waiting are
    /// skipped and dropped from the queue.
    pub async fn drain_waiting(&self) {
        while let Some(member_id) = self.queue.pop() {
            let Some(member_conn) = self.registry.lookup(&member_id) else {
                info!(member = %member_id, "waiting member no longer connected, dropped");
                continue;
            };

            self.request_call(&member_id, &member_conn).await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::registry::PeerSender;
    use crate::directory::MemoryDirectory;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;
    use uuid::Uuid;

    struct Fixture {
        directory: Arc<MemoryDirectory>,
        registry: Arc<ConnectionRegistry>,
        queue: Arc<WaitingQueue>,
        sessions: Arc<SessionTable>,
        matcher: Matcher,
    }

    fn fixture() -> Fixture {
        let directory = Arc::new(MemoryDirectory::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let queue = Arc::new(WaitingQueue::new());
        let sessions = Arc::new(SessionTable::new());
        let matcher = Matcher::new(
            Arc::clone(&directory) as Arc<dyn Directory>,
            Arc::clone(&registry),
            Arc::clone(&queue),
            Arc::clone(&sessions),
        );
        Fixture {
            directory,
            registry,
            queue,
            sessions,
            matcher,
        }
    }

    fn connect(registry: &ConnectionRegistry, identity: &str) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(identity, PeerSender::new(Uuid::new_v4(), tx));
        rx
    }

    fn recv_json(rx: &mut mpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        let msg = rx.try_recv().expect("expected a message");
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn match_notifies_both_parties_and_reserves_agent() {
        let fx = fixture();
        let mut agent_rx = connect(&fx.registry, "alice");
        let mut member_rx = connect(&fx.registry, "m-1");
        fx.directory
            .set_online_available("alice", true, true)
            .await
            .unwrap();

        let member = fx.registry.lookup("m-1").unwrap();
        fx.matcher.request_call("m-1", &member).await;

        let to_agent = recv_json(&mut agent_rx);
        assert_eq!(to_agent["type"], "incoming_call");
        assert_eq!(to_agent["userId"], "m-1");

        let to_member = recv_json(&mut member_rx);
        assert_eq!(to_member["type"], "agent_assigned");
        assert_eq!(to_member["agentName"], "alice");

        // Exactly one notification each
        assert!(agent_rx.try_recv().is_err());
        assert!(member_rx.try_recv().is_err());

        let flags = fx.directory.agent_flags("alice").unwrap();
        assert!(flags.online && !flags.available);

        let session = fx.sessions.find_by_participant("m-1").unwrap();
        assert_eq!(session.agent, "alice");
        assert!(fx.queue.is_empty());
    }

    #[tokio::test]
    async fn no_agent_queues_member_without_mutating_state() {
        let fx = fixture();
        let mut member_rx = connect(&fx.registry, "m-1");
        fx.directory
            .set_online_available("alice", true, false)
            .await
            .unwrap();

        let member = fx.registry.lookup("m-1").unwrap();
        fx.matcher.request_call("m-1", &member).await;

        assert_eq!(recv_json(&mut member_rx)["type"], "waiting");
        assert_eq!(fx.queue.len(), 1);
        assert!(fx.sessions.is_empty());

        // Busy agent untouched
        let flags = fx.directory.agent_flags("alice").unwrap();
        assert!(flags.online && !flags.available);
    }

    #[tokio::test]
    async fn stale_reservation_is_reconciled_and_retried() {
        let fx = fixture();
        let mut member_rx = connect(&fx.registry, "m-1");
        // "ghost" is marked available but never connected
        fx.directory
            .set_online_available("ghost", true, true)
            .await
            .unwrap();

        let member = fx.registry.lookup("m-1").unwrap();
        fx.matcher.request_call("m-1", &member).await;

        // The ghost record must not be left reserved forever
        let flags = fx.directory.agent_flags("ghost").unwrap();
        assert!(!flags.online && !flags.available);

        // With no live agent left, the member waits
        assert_eq!(recv_json(&mut member_rx)["type"], "waiting");
        assert_eq!(fx.queue.len(), 1);
    }

    #[tokio::test]
    async fn stale_reservation_falls_through_to_live_agent() {
        let fx = fixture();
        let mut member_rx = connect(&fx.registry, "m-1");
        let mut agent_rx = connect(&fx.registry, "alice");
        fx.directory
            .set_online_available("ghost", true, true)
            .await
            .unwrap();
        fx.directory
            .set_online_available("alice", true, true)
            .await
            .unwrap();

        let member = fx.registry.lookup("m-1").unwrap();
        // Whichever record the scan reserves first, the request must end in
        // an assignment to the live agent: a ghost reservation is reconciled
        // and retried within the same call.
        fx.matcher.request_call("m-1", &member).await;

        let session = fx.sessions.find_by_participant("m-1").unwrap();
        assert_eq!(session.agent, "alice");
        assert_eq!(recv_json(&mut agent_rx)["type"], "incoming_call");
        assert_eq!(recv_json(&mut member_rx)["type"], "agent_assigned");
        assert!(fx.queue.is_empty());
    }

    #[tokio::test]
    async fn concurrent_requests_never_share_one_agent() {
        let fx = fixture();
        let _agent_rx = connect(&fx.registry, "alice");
        let _m1_rx = connect(&fx.registry, "m-1");
        let _m2_rx = connect(&fx.registry, "m-2");
        fx.directory
            .set_online_available("alice", true, true)
            .await
            .unwrap();

        let m1 = fx.registry.lookup("m-1").unwrap();
        let m2 = fx.registry.lookup("m-2").unwrap();

        tokio::join!(
            fx.matcher.request_call("m-1", &m1),
            fx.matcher.request_call("m-2", &m2),
        );

        // Exactly one member got the agent, the other is queued
        assert_eq!(fx.sessions.len(), 1);
        assert_eq!(fx.queue.len(), 1);

        let session = fx.sessions.find_by_participant("alice").unwrap();
        assert!(session.member == "m-1" || session.member == "m-2");
    }

    #[tokio::test]
    async fn drain_matches_oldest_waiting_member() {
        let fx = fixture();
        let mut m1_rx = connect(&fx.registry, "m-1");
        let mut agent_rx = connect(&fx.registry, "alice");

        // m-1 asks before any agent exists
        let m1 = fx.registry.lookup("m-1").unwrap();
        fx.matcher.request_call("m-1", &m1).await;
        assert_eq!(recv_json(&mut m1_rx)["type"], "waiting");

        // Agent comes online, pool gains capacity, backlog drains
        fx.directory
            .set_online_available("alice", true, true)
            .await
            .unwrap();
        fx.matcher.drain_waiting().await;

        assert_eq!(recv_json(&mut m1_rx)["type"], "agent_assigned");
        assert_eq!(recv_json(&mut agent_rx)["type"], "incoming_call");
        assert!(fx.queue.is_empty());
    }

    #[tokio::test]
    async fn drain_skips_disconnected_members() {
        let fx = fixture();
        let mut m2_rx = connect(&fx.registry, "m-2");
        let _agent_rx = connect(&fx.registry, "alice");

        // m-1 queued but never connected; m-2 queued and live
        fx.queue.push("m-1");
        fx.queue.push("m-2");
        fx.directory
            .set_online_available("alice", true, true)
            .await
            .unwrap();

        fx.matcher.drain_waiting().await;

        assert_eq!(recv_json(&mut m2_rx)["type"], "agent_assigned");
        assert!(fx.queue.is_empty());
    }
}
