//! ControlContext: collaborators shared by the main and recovery loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use searchscale_core::{ConfigSource, ScaleDirection, ScalerConfig};
use searchscale_provision::Provisioner;
use searchscale_state::{OperationState, StateManager, StateResult};

use crate::budget::RetryPolicy;
use crate::leader::LeadershipOracle;
use crate::recommend::RecommendationSource;

const DEFAULT_LEADER_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a control loop needs for one tick.
pub struct ControlContext {
    pub state: Arc<StateManager>,
    pub leadership: Arc<dyn LeadershipOracle>,
    pub recommender: Arc<dyn RecommendationSource>,
    pub provisioner: Arc<dyn Provisioner>,
    pub config: Arc<dyn ConfigSource>,
    retry: RetryPolicy,
    leader_timeout: Duration,
    /// Held while a provisioning action runs in this process.
    execution: Mutex<()>,
}

impl ControlContext {
    pub fn new(
        state: Arc<StateManager>,
        leadership: Arc<dyn LeadershipOracle>,
        recommender: Arc<dyn RecommendationSource>,
        provisioner: Arc<dyn Provisioner>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            state,
            leadership,
            recommender,
            provisioner,
            config,
            retry: RetryPolicy::default(),
            leader_timeout: DEFAULT_LEADER_TIMEOUT,
            execution: Mutex::new(()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_leader_timeout(mut self, timeout: Duration) -> Self {
        self.leader_timeout = timeout;
        self
    }

    /// Re-read the Operation State, retrying transient store errors.
    pub async fn refresh_state(&self) -> StateResult<OperationState> {
        self.retry.run(move || self.state.refresh()).await
    }

    /// Query the oracle. Errors and timeouts count as "not leader" for
    /// this tick.
    pub async fn is_leader(&self) -> bool {
        match tokio::time::timeout(self.leader_timeout, self.leadership.is_leader()).await {
            Ok(Ok(leader)) => leader,
            Ok(Err(e)) => {
                warn!(error = %e, "leadership query failed");
                false
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.leader_timeout.as_millis() as u64,
                    "leadership query timed out"
                );
                false
            }
        }
    }

    /// Claim the in-process execution slot, or `None` if the other loop
    /// is already provisioning.
    pub fn try_execute(&self) -> Option<MutexGuard<'_, ()>> {
        self.execution.try_lock().ok()
    }

    /// Run the provisioning action for `direction` against the recorded
    /// operation.
    pub async fn dispatch(&self, direction: ScaleDirection, config: &ScalerConfig) -> bool {
        let cluster = &config.cluster_details;
        let user = &config.user_config;
        debug!(%direction, cluster = %cluster.cluster_id(), "dispatching provisioning action");
        match direction {
            ScaleDirection::Up => self.provisioner.scale_out(cluster, user, &self.state).await,
            ScaleDirection::Down => self.provisioner.scale_in(cluster, user, &self.state).await,
        }
    }
}
