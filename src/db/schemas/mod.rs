//! Database schemas for switchboard
//!
//! Defines MongoDB document structures for agent availability and KYC cases.

mod agent;
mod case;
mod metadata;

pub use agent::{AgentDoc, AGENT_COLLECTION};
pub use case::{CaseDoc, CASE_COLLECTION};
pub use metadata::Metadata;
