//! The Operation State record.
//!
//! Serialized as a single JSON document per cluster. Fields beyond
//! `operation` let a resumed provisioning run pick up where the previous
//! leader stopped instead of starting over.

use serde::{Deserialize, Serialize};

use searchscale_core::{ScaleAction, ScaleDirection};

/// Which scaling operation, if any, is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    Idle,
    ScalingUp,
    ScalingDown,
}

impl Operation {
    pub fn from_direction(direction: ScaleDirection) -> Self {
        match direction {
            ScaleDirection::Up => Operation::ScalingUp,
            ScaleDirection::Down => Operation::ScalingDown,
        }
    }

    /// The scale direction of an in-flight operation.
    pub fn direction(&self) -> Option<ScaleDirection> {
        match self {
            Operation::Idle => None,
            Operation::ScalingUp => Some(ScaleDirection::Up),
            Operation::ScalingDown => Some(ScaleDirection::Down),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Operation::Idle)
    }
}

/// Progress within a scaling operation.
///
/// Scale-out moves `Pending → NodesLaunched → NodesJoined`; scale-in moves
/// `Pending → NodesDrained → NodesTerminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Pending,
    NodesLaunched,
    NodesJoined,
    NodesDrained,
    NodesTerminated,
}

/// Durable record of the cluster's scaling operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OperationState {
    pub operation: Operation,
    #[serde(default)]
    pub stage: Stage,
    /// Task that produced the current operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// Number of nodes to add or remove.
    #[serde(default)]
    pub node_delta: u32,
    /// Nodes launched (scale-out) or drained (scale-in) so far.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Unix seconds when the current operation began.
    #[serde(default)]
    pub started_at: u64,
    /// Unix seconds of the last persisted change.
    #[serde(default)]
    pub updated_at: u64,
    /// Executions of the current operation, including resumptions.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OperationState {
    /// A fresh idle record.
    pub fn idle(now: u64) -> Self {
        Self {
            updated_at: now,
            ..Self::default()
        }
    }

    /// A record for a newly selected scale action.
    pub fn begin(action: ScaleAction, task_name: &str, now: u64) -> Self {
        Self {
            operation: Operation::from_direction(action.direction),
            stage: Stage::Pending,
            task_name: Some(task_name.to_string()),
            node_delta: action.nodes,
            nodes: Vec::new(),
            started_at: now,
            updated_at: now,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.operation.is_idle()
    }

    /// Whether this is the untouched record a `begin` for `action` and
    /// `task_name` would have written at or after `since`.
    pub fn is_fresh_begin(&self, action: ScaleAction, task_name: &str, since: u64) -> bool {
        self.operation == Operation::from_direction(action.direction)
            && self.stage == Stage::Pending
            && self.attempts == 0
            && self.node_delta == action.nodes
            && self.task_name.as_deref() == Some(task_name)
            && self.started_at >= since
    }

    /// Return to `Idle`, keeping only the last error for operators.
    pub fn reset(&mut self) {
        let last_error = self.last_error.take();
        *self = Self {
            last_error,
            ..Self::default()
        };
    }
}
