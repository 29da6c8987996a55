//! Switchboard - session matching and signaling relay for video KYC
//!
//! Members request a live video verification session, switchboard matches
//! them to an available human agent from a MongoDB-backed directory, then
//! relays WebRTC negotiation payloads between the matched peers until the
//! call ends.
//!
//! ## Services
//!
//! - **Call channel**: one WebSocket per participant, JSON messages with a
//!   `type` discriminator
//! - **Matcher**: atomic agent reservation against the directory
//! - **Relay**: verbatim forwarding of offer/answer/ICE payloads
//! - **Probes**: /health, /ready, /version HTTP endpoints

pub mod call;
pub mod config;
pub mod db;
pub mod directory;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, SwitchboardError};
