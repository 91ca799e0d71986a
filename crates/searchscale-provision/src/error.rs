//! Provisioning error types.

use thiserror::Error;

use searchscale_state::{Operation, Stage, StateError};

/// Errors that can occur while executing a scale action.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("cluster has {current} nodes; adding {requested} exceeds the limit of {max}")]
    CapacityExceeded { current: u32, requested: u32, max: u32 },

    #[error("cluster has {current} nodes; removing {requested} would leave none")]
    BelowMinimum { current: u32, requested: u32 },

    #[error("operation is {found:?}, expected {expected:?}")]
    WrongOperation { expected: Operation, found: Operation },

    #[error("stage {stage:?} does not belong to {operation:?}")]
    WrongStage { operation: Operation, stage: Stage },

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("cloud provider error: {0}")]
    Cloud(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;
