//! Error types for the state store.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StateError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StateError::Transport(_)
            | StateError::Timeout(_)
            | StateError::Transaction(_)
            | StateError::Read(_)
            | StateError::Write(_) => true,
            StateError::Status { status, .. } => *status >= 500 || *status == 429,
            StateError::Open(_)
            | StateError::Table(_)
            | StateError::Serialize(_)
            | StateError::Deserialize(_) => false,
        }
    }
}
