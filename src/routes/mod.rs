//! HTTP routes for switchboard

pub mod health;

pub use health::{health_check, readiness_check, root_status, version_info};
