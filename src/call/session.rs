//! Session table — tracks each matched member/agent pairing
//!
//! A session is created in `Assigned` when the matcher pairs a member with a
//! reserved agent, moves to `InCall` when the first negotiation payload is
//! exchanged, and is removed from the table the moment it ends — `Ended` is
//! terminal and never stored.
//!
//! Both participants index the same session, so either side's disconnect can
//! find and tear it down.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Agent notified, negotiation not yet started
    Assigned,
    /// Negotiation payloads have been exchanged
    InCall,
}

/// One matched member/agent pairing
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub member: String,
    pub agent: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// The other party of the pairing
    pub fn peer_of(&self, identity: &str) -> Option<&str> {
        if self.member == identity {
            Some(&self.agent)
        } else if self.agent == identity {
            Some(&self.member)
        } else {
            None
        }
    }
}

/// Table of in-progress sessions, indexed by id and by both participants
#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<Uuid, Session>,
    by_participant: DashMap<String, Uuid>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session in `Assigned` state and index both participants.
    ///
    /// A participant re-entering a session (e.g. a member matched again after
    /// a stale pairing was never torn down) simply points at the new session;
    /// the old session stays until its own teardown path runs.
    pub fn create(&self, member: &str, agent: &str) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            member: member.to_string(),
            agent: agent.to_string(),
            state: SessionState::Assigned,
            created_at: Utc::now(),
        };

        self.sessions.insert(session.id, session.clone());
        self.by_participant.insert(member.to_string(), session.id);
        self.by_participant.insert(agent.to_string(), session.id);

        debug!(
            session = %session.id,
            member = %member,
            agent = %agent,
            "session created"
        );

        session
    }

    /// Find the session a participant is currently part of
    pub fn find_by_participant(&self, identity: &str) -> Option<Session> {
        let id = *self.by_participant.get(identity)?;
        self.sessions.get(&id).map(|entry| entry.clone())
    }

    /// Promote a session from `Assigned` to `InCall`. Any other transition
    /// request is ignored.
    pub fn mark_in_call(&self, id: Uuid) {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            if session.state == SessionState::Assigned {
                session.state = SessionState::InCall;
                debug!(session = %id, "session in call");
            }
        }
    }

    /// End a session: remove it and both participant indexes, returning the
    /// final session for reconciliation. Returns `None` if already ended.
    pub fn end(&self, id: Uuid) -> Option<Session> {
        let (_, session) = self.sessions.remove(&id)?;

        // Only drop participant indexes still pointing at this session; a
        // participant may have been re-matched into a newer one meanwhile.
        self.by_participant
            .remove_if(&session.member, |_, current| *current == id);
        self.by_participant
            .remove_if(&session.agent, |_, current| *current == id);

        debug!(
            session = %id,
            member = %session.member,
            agent = %session.agent,
            "session ended"
        );

        Some(session)
    }

    /// Number of in-progress sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_indexes_both_participants() {
        let table = SessionTable::new();
        let session = table.create("m-1", "alice");

        assert_eq!(session.state, SessionState::Assigned);
        assert_eq!(table.len(), 1);

        let by_member = table.find_by_participant("m-1").unwrap();
        let by_agent = table.find_by_participant("alice").unwrap();
        assert_eq!(by_member.id, session.id);
        assert_eq!(by_agent.id, session.id);

        assert_eq!(by_member.peer_of("m-1"), Some("alice"));
        assert_eq!(by_member.peer_of("alice"), Some("m-1"));
        assert_eq!(by_member.peer_of("stranger"), None);
    }

    #[test]
    fn mark_in_call_only_from_assigned() {
        let table = SessionTable::new();
        let session = table.create("m-1", "alice");

        table.mark_in_call(session.id);
        assert_eq!(
            table.find_by_participant("m-1").unwrap().state,
            SessionState::InCall
        );

        // Idempotent: a second promotion changes nothing
        table.mark_in_call(session.id);
        assert_eq!(
            table.find_by_participant("m-1").unwrap().state,
            SessionState::InCall
        );
    }

    #[test]
    fn end_removes_session_and_indexes() {
        let table = SessionTable::new();
        let session = table.create("m-1", "alice");

        let ended = table.end(session.id).unwrap();
        assert_eq!(ended.member, "m-1");
        assert_eq!(ended.agent, "alice");

        assert!(table.is_empty());
        assert!(table.find_by_participant("m-1").is_none());
        assert!(table.find_by_participant("alice").is_none());

        // Ending twice is a no-op
        assert!(table.end(session.id).is_none());
    }

    #[test]
    fn ending_old_session_keeps_newer_participant_index() {
        let table = SessionTable::new();
        let old = table.create("m-1", "alice");
        // Same agent re-matched to another member before the old teardown ran
        let new = table.create("m-2", "alice");

        table.end(old.id);

        // Alice still indexes the newer session
        assert_eq!(table.find_by_participant("alice").unwrap().id, new.id);
        assert!(table.find_by_participant("m-1").is_none());
    }
}
