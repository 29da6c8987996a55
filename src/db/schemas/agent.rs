//! Agent availability document schema
//!
//! One document per verification agent. The `online`/`available` pair is the
//! authoritative presence record consulted by the matcher; `available` is
//! only ever true while `online` is true.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Collection name for agents
pub const AGENT_COLLECTION: &str = "agents";

/// Agent availability document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct AgentDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Agent identifier (the name the agent registers with)
    pub identifier: String,

    /// Whether the agent currently has a live connection
    #[serde(default)]
    pub online: bool,

    /// Whether the agent can take a new call (implies online)
    #[serde(default)]
    pub available: bool,
}

impl IntoIndexes for AgentDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on identifier
            (
                doc! { "identifier": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("identifier_unique".to_string())
                        .build(),
                ),
            ),
            // Compound index backing the atomic reservation query
            (
                doc! { "online": 1, "available": 1 },
                Some(
                    IndexOptions::builder()
                        .name("availability_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
