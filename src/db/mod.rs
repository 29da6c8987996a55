//! MongoDB access layer
//!
//! The directory store (agent availability flags) and the case record store
//! live in MongoDB. This module owns the client wrapper and document schemas;
//! the query surface the rest of the system uses is in [`crate::directory`].

pub mod mongo;
pub mod schemas;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
