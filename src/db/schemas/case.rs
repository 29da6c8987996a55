//! KYC case record schema
//!
//! One document per member case, keyed by the numeric case number carried in
//! `kyc_status_update` messages. The outcome fields are overwritten on every
//! update; repeating an update is harmless.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::schemas::Metadata;

/// Collection name for KYC cases
pub const CASE_COLLECTION: &str = "cases";

/// Case outcome document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CaseDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Numeric member case number
    pub case_no: i64,

    /// Verification outcome (e.g. "approved", "rejected")
    pub status: String,

    /// Identity of the operator who recorded the outcome
    pub assigned_operator: String,

    /// When the outcome was last written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime>,
}

impl IntoIndexes for CaseDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "case_no": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("case_no_unique".to_string())
                    .build(),
            ),
        )]
    }
}
