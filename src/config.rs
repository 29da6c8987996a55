//! Configuration for switchboard
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Default cap on concurrent participant connections
pub const DEFAULT_MAX_CLIENTS: usize = 32768;

/// Switchboard - session matching and signaling relay for video KYC
#[derive(Parser, Debug, Clone)]
#[command(name = "switchboard")]
#[command(about = "Matches members to verification agents and relays WebRTC signaling")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// MongoDB connection URI for the agent directory and case store
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "switchboard")]
    pub mongodb_db: String,

    /// Enable development mode (MongoDB optional, in-memory directory fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Maximum concurrent participant connections
    #[arg(long, env = "MAX_CLIENTS")]
    pub max_clients: Option<usize>,
}

impl Args {
    /// Effective connection cap
    pub fn max_clients(&self) -> usize {
        self.max_clients.unwrap_or(DEFAULT_MAX_CLIENTS)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_clients {
            if max == 0 {
                return Err("MAX_CLIENTS must be greater than zero".to_string());
            }
        }

        if self.mongodb_db.is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }

        Ok(())
    }
}
