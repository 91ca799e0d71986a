//! StateManager: owner of the cluster's Operation State.
//!
//! Both control loops and the provisioning actions share one
//! `Arc<StateManager>`. The in-memory record sits behind an async mutex and
//! every mutation is persisted before the lock is released, so the record
//! held in memory never runs ahead of the store.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, info};

use searchscale_core::ScaleAction;

use crate::error::{StateError, StateResult};
use crate::key::document_key;
use crate::store::DocumentStore;
use crate::types::{OperationState, Stage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads and writes the singleton Operation State document.
pub struct StateManager {
    store: Arc<dyn DocumentStore>,
    key: String,
    current: Mutex<OperationState>,
    timeout: Duration,
}

impl StateManager {
    /// Create a manager for the cluster identified by `cluster_id`.
    pub fn new(store: Arc<dyn DocumentStore>, cluster_id: &str) -> Self {
        Self {
            store,
            key: document_key(cluster_id),
            current: Mutex::new(OperationState::default()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-call store timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The document key derived from the cluster identity.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Create the backing index if needed.
    pub async fn ensure_index(&self) -> StateResult<()> {
        self.call(self.store.ensure_index()).await
    }

    /// The last record read or written, without touching the store.
    pub async fn cached(&self) -> OperationState {
        self.current.lock().await.clone()
    }

    /// Re-read the record from the store.
    ///
    /// A missing document is initialized to `Idle` and written back, which
    /// only happens the first time a cluster is seen.
    pub async fn refresh(&self) -> StateResult<OperationState> {
        let mut current = self.current.lock().await;
        match self.call(self.store.get(&self.key)).await? {
            Some(doc) => {
                *current = serde_json::from_value(doc)
                    .map_err(|e| StateError::Deserialize(e.to_string()))?;
            }
            None => {
                let fresh = OperationState::idle(epoch_secs());
                self.write(&fresh).await?;
                *current = fresh;
                info!(key = %self.key, "operation state initialized");
            }
        }
        Ok(current.clone())
    }

    /// Write the in-memory record to the store as-is.
    pub async fn persist(&self) -> StateResult<()> {
        let current = self.current.lock().await;
        self.write(&current).await
    }

    /// Apply `f` to a copy of the record, persist it, then commit it in
    /// memory. On a store error the in-memory record is left unchanged.
    pub async fn update<F>(&self, f: F) -> StateResult<OperationState>
    where
        F: FnOnce(&mut OperationState),
    {
        let mut current = self.current.lock().await;
        let mut next = current.clone();
        f(&mut next);
        next.updated_at = epoch_secs();
        self.write(&next).await?;
        *current = next;
        Ok(current.clone())
    }

    /// Mark a new scale action as in progress.
    pub async fn begin(&self, action: ScaleAction, task_name: &str) -> StateResult<OperationState> {
        let state = self
            .update(|s| *s = OperationState::begin(action, task_name, epoch_secs()))
            .await?;
        info!(
            key = %self.key,
            operation = ?state.operation,
            nodes = action.nodes,
            task = %task_name,
            "scaling operation started"
        );
        Ok(state)
    }

    /// Record progress to `stage`, replacing the tracked node list.
    pub async fn advance(&self, stage: Stage, nodes: Vec<String>) -> StateResult<OperationState> {
        let state = self
            .update(|s| {
                s.stage = stage;
                s.nodes = nodes;
            })
            .await?;
        debug!(key = %self.key, ?stage, "operation advanced");
        Ok(state)
    }

    /// Count another execution of the current operation.
    pub async fn start_attempt(&self) -> StateResult<OperationState> {
        self.update(|s| s.attempts += 1).await
    }

    /// Return the record to `Idle` after a finished operation.
    pub async fn complete(&self) -> StateResult<OperationState> {
        let state = self
            .update(|s| {
                s.last_error = None;
                s.reset();
            })
            .await?;
        info!(key = %self.key, "scaling operation completed");
        Ok(state)
    }

    /// Record a failed execution.
    ///
    /// With `keep_operation` the operation stays in flight for a later
    /// resumption; otherwise the record returns to `Idle`.
    pub async fn record_failure(
        &self,
        error: &str,
        keep_operation: bool,
    ) -> StateResult<OperationState> {
        self.update(|s| {
            s.last_error = Some(error.to_string());
            if !keep_operation {
                s.reset();
            }
        })
        .await
    }

    async fn write(&self, state: &OperationState) -> StateResult<()> {
        let doc = serde_json::to_value(state).map_err(|e| StateError::Serialize(e.to_string()))?;
        self.call(self.store.upsert(&self.key, &doc)).await
    }

    async fn call<T>(&self, fut: impl Future<Output = StateResult<T>>) -> StateResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StateError::Timeout(self.timeout))?
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
