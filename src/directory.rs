//! Directory client — agent availability and case outcome store
//!
//! The matcher and reconciler consume the external availability store through
//! this interface only. Two implementations exist: [`MongoDirectory`] for
//! production and [`MemoryDirectory`] for dev mode (no MongoDB configured)
//! and tests.
//!
//! ## Reservation atomicity
//!
//! `reserve_available_agent` is the one operation with a real consistency
//! contract: selecting an available agent and marking it unavailable must be
//! a single atomic step. A separate read followed by a separate write lets
//! two concurrent call requests claim the same agent. MongoDirectory uses a
//! server-side `findOneAndUpdate`; MemoryDirectory holds its lock across the
//! scan and the flag flip.
//!
//! Which agent is reserved when several are available is whatever the store
//! returns first — deliberately unspecified, callers must not rely on it.

use async_trait::async_trait;
use bson::{doc, DateTime};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::db::schemas::{AgentDoc, CaseDoc, AGENT_COLLECTION, CASE_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::Result;

/// Query/update surface of the availability and case stores
#[async_trait]
pub trait Directory: Send + Sync {
    /// Atomically reserve one available agent (select + mark unavailable).
    /// Returns the reserved agent's identifier, or `None` if no agent is
    /// both online and available.
    async fn reserve_available_agent(&self) -> Result<Option<String>>;

    /// Set both presence flags for an agent. Marking an agent online
    /// registers the record if it does not exist yet; marking offline only
    /// updates an existing record — identities without a record (members)
    /// are a normal no-op, not an error.
    async fn set_online_available(&self, agent: &str, online: bool, available: bool)
        -> Result<()>;

    /// Set only the `available` flag. Setting it to true is a no-op for an
    /// agent that is not online — `available` implies `online`.
    async fn set_available(&self, agent: &str, available: bool) -> Result<()>;

    /// Record a verification outcome against a member's case. Overwrites any
    /// previous outcome for the same case number.
    async fn record_case_outcome(&self, case_no: i64, status: &str, operator: &str)
        -> Result<()>;
}

// ============================================================================
// MongoDB implementation
// ============================================================================

/// MongoDB-backed directory
pub struct MongoDirectory {
    agents: MongoCollection<AgentDoc>,
    cases: MongoCollection<CaseDoc>,
}

impl MongoDirectory {
    /// Create the directory, binding (and indexing) both collections
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let agents = client.collection::<AgentDoc>(AGENT_COLLECTION).await?;
        let cases = client.collection::<CaseDoc>(CASE_COLLECTION).await?;
        Ok(Self { agents, cases })
    }
}

#[async_trait]
impl Directory for MongoDirectory {
    async fn reserve_available_agent(&self) -> Result<Option<String>> {
        let reserved = self
            .agents
            .find_one_and_update(
                doc! { "online": true, "available": true },
                doc! { "$set": { "available": false, "metadata.updated_at": DateTime::now() } },
            )
            .await?;

        Ok(reserved.map(|agent| agent.identifier))
    }

    async fn set_online_available(
        &self,
        agent: &str,
        online: bool,
        available: bool,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "online": online,
                "available": available,
                "metadata.updated_at": DateTime::now(),
            },
        };

        if online {
            // Coming online registers the agent record on first sight
            let mut update = update;
            update.insert(
                "$setOnInsert",
                doc! {
                    "metadata.created_at": DateTime::now(),
                    "metadata.is_deleted": false,
                },
            );
            self.agents
                .upsert_one(doc! { "identifier": agent }, update)
                .await?;
        } else {
            // Going offline must not create records: members have none, and
            // that is the normal case here
            let result = self
                .agents
                .update_one(doc! { "identifier": agent }, update)
                .await?;
            if result.matched_count == 0 {
                debug!(identity = %agent, "no directory record to mark offline");
            }
        }
        Ok(())
    }

    async fn set_available(&self, agent: &str, available: bool) -> Result<()> {
        // Restoring availability is conditional on the agent still being
        // online, preserving the `available implies online` invariant even
        // when a call_ended races a disconnect.
        let filter = if available {
            doc! { "identifier": agent, "online": true }
        } else {
            doc! { "identifier": agent }
        };

        let result = self
            .agents
            .update_one(
                filter,
                doc! { "$set": { "available": available, "metadata.updated_at": DateTime::now() } },
            )
            .await?;

        if result.matched_count == 0 {
            debug!(agent = %agent, "availability update matched no record");
        }
        Ok(())
    }

    async fn record_case_outcome(&self, case_no: i64, status: &str, operator: &str) -> Result<()> {
        self.cases
            .upsert_one(
                doc! { "case_no": case_no },
                doc! {
                    "$set": {
                        "status": status,
                        "assigned_operator": operator,
                        "last_updated_at": DateTime::now(),
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$setOnInsert": {
                        "metadata.created_at": DateTime::now(),
                        "metadata.is_deleted": false,
                    },
                },
            )
            .await?;
        Ok(())
    }
}

// ============================================================================
// In-memory implementation (dev mode, tests)
// ============================================================================

/// Presence flags for one agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentFlags {
    pub online: bool,
    pub available: bool,
}

/// Recorded outcome for one case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseOutcome {
    pub status: String,
    pub assigned_operator: String,
}

/// In-memory directory used when no MongoDB is configured (dev mode) and in
/// tests. A single mutex guards each map, so reserve is naturally atomic.
#[derive(Default)]
pub struct MemoryDirectory {
    agents: Mutex<HashMap<String, AgentFlags>>,
    cases: Mutex<HashMap<i64, CaseOutcome>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current flags for an agent, if known
    pub fn agent_flags(&self, agent: &str) -> Option<AgentFlags> {
        self.agents.lock().unwrap().get(agent).copied()
    }

    /// Recorded outcome for a case, if any
    pub fn case_outcome(&self, case_no: i64) -> Option<CaseOutcome> {
        self.cases.lock().unwrap().get(&case_no).cloned()
    }

    /// Number of case records held
    pub fn case_count(&self) -> usize {
        self.cases.lock().unwrap().len()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn reserve_available_agent(&self) -> Result<Option<String>> {
        let mut agents = self.agents.lock().unwrap();
        // Scan and flip under one lock; iteration order is as unspecified
        // as MongoDB's natural order, which matches the contract.
        let candidate = agents
            .iter()
            .find(|(_, flags)| flags.online && flags.available)
            .map(|(id, _)| id.clone());

        if let Some(ref id) = candidate {
            if let Some(flags) = agents.get_mut(id) {
                flags.available = false;
            }
        }

        Ok(candidate)
    }

    async fn set_online_available(
        &self,
        agent: &str,
        online: bool,
        available: bool,
    ) -> Result<()> {
        let mut agents = self.agents.lock().unwrap();
        if online {
            agents.insert(agent.to_string(), AgentFlags { online, available });
        } else if let Some(flags) = agents.get_mut(agent) {
            // Going offline never creates a record; members have none
            *flags = AgentFlags { online, available };
        }
        Ok(())
    }

    async fn set_available(&self, agent: &str, available: bool) -> Result<()> {
        if let Some(flags) = self.agents.lock().unwrap().get_mut(agent) {
            if !available || flags.online {
                flags.available = available;
            }
        }
        Ok(())
    }

    async fn record_case_outcome(&self, case_no: i64, status: &str, operator: &str) -> Result<()> {
        self.cases.lock().unwrap().insert(
            case_no,
            CaseOutcome {
                status: status.to_string(),
                assigned_operator: operator.to_string(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reserve_marks_agent_unavailable() {
        let dir = MemoryDirectory::new();
        dir.set_online_available("alice", true, true).await.unwrap();

        let reserved = dir.reserve_available_agent().await.unwrap();
        assert_eq!(reserved.as_deref(), Some("alice"));

        let flags = dir.agent_flags("alice").unwrap();
        assert!(flags.online);
        assert!(!flags.available);

        // Pool is now empty
        assert!(dir.reserve_available_agent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reserve_skips_offline_agents() {
        let dir = MemoryDirectory::new();
        dir.set_online_available("bob", true, true).await.unwrap();
        dir.set_online_available("bob", false, false).await.unwrap();

        assert!(dir.reserve_available_agent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn going_offline_never_creates_a_record() {
        let dir = MemoryDirectory::new();
        // A member disconnect reaches the directory with an identity that
        // has no record; that must stay a no-op
        dir.set_online_available("m-1", false, false).await.unwrap();

        assert!(dir.agent_flags("m-1").is_none());
    }

    #[tokio::test]
    async fn concurrent_reserves_never_share_an_agent() {
        use std::sync::Arc;

        let dir = Arc::new(MemoryDirectory::new());
        dir.set_online_available("alice", true, true).await.unwrap();
        dir.set_online_available("bob", true, true).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let dir = Arc::clone(&dir);
            handles.push(tokio::spawn(async move {
                dir.reserve_available_agent().await.unwrap()
            }));
        }

        let mut reserved = Vec::new();
        for handle in handles {
            if let Some(agent) = handle.await.unwrap() {
                reserved.push(agent);
            }
        }

        // Two agents, so exactly two reservations succeed and they differ
        assert_eq!(reserved.len(), 2);
        assert_ne!(reserved[0], reserved[1]);
    }

    #[tokio::test]
    async fn set_available_true_requires_online() {
        let dir = MemoryDirectory::new();
        dir.set_online_available("carol", false, false)
            .await
            .unwrap();

        dir.set_available("carol", true).await.unwrap();

        let flags = dir.agent_flags("carol").unwrap();
        assert!(!flags.available, "offline agent must not become available");
    }

    #[tokio::test]
    async fn case_outcome_overwrites_without_duplicating() {
        let dir = MemoryDirectory::new();
        dir.record_case_outcome(42, "pending", "alice").await.unwrap();
        dir.record_case_outcome(42, "approved", "alice").await.unwrap();

        assert_eq!(dir.case_count(), 1);
        let outcome = dir.case_outcome(42).unwrap();
        assert_eq!(outcome.status, "approved");
        assert_eq!(outcome.assigned_operator, "alice");
    }
}
