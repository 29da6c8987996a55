//! HTTP server and WebSocket upgrade handling

pub mod http;
pub mod websocket;

pub use http::{run, AppState};
