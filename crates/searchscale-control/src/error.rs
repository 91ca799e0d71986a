//! Control loop error types.

use thiserror::Error;

use searchscale_core::ConfigError;
use searchscale_state::StateError;

/// Errors that stop a control loop.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("document store unavailable after {failures} consecutive failures: {source}")]
    StoreUnavailable {
        failures: u32,
        #[source]
        source: StateError,
    },

    #[error("control task failed: {0}")]
    Task(String),
}

/// Errors that prevent the daemon from starting.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("state store error: {0}")]
    Store(#[from] StateError),

    #[error("failed to build {component}: {reason}")]
    Component { component: &'static str, reason: String },
}
