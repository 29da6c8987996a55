//! Call core: matching, sessions, signaling relay
//!
//! Everything stateful about a verification call lives here:
//!
//! - [`registry`] — identity → live connection map
//! - [`queue`] — backlog of members waiting for an agent
//! - [`session`] — matched pairings and their lifecycle
//! - [`matcher`] — agent reservation and pairing
//! - [`protocol`] — wire message types
//! - [`handler`] — per-connection dispatch and disconnect reconciliation

pub mod handler;
pub mod matcher;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod session;

pub use handler::{handle_connection, CallHub};
pub use matcher::Matcher;
pub use protocol::{ClientMessage, Role, ServerMessage};
pub use queue::WaitingQueue;
pub use registry::{ConnectionId, ConnectionRegistry, PeerSender};
pub use session::{Session, SessionState, SessionTable};
