//! Shared error types for switchboard

use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum SwitchboardError {
    /// MongoDB / directory store failure
    #[error("database error: {0}")]
    Database(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Network / listener failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias
pub type Result<T> = std::result::Result<T, SwitchboardError>;
