//! StagedProvisioner: resumable scale-out and scale-in.
//!
//! Each stage is persisted before the next one starts, so a run that picks
//! up an operation from another process skips whatever the Operation State
//! already records as done.

use async_trait::async_trait;
use tracing::{error, info, warn};

use searchscale_core::{ClusterDetails, FailurePolicy, UserConfig};
use searchscale_state::{Operation, OperationState, Stage, StateManager};

use crate::Provisioner;
use crate::cloud::CloudProvider;
use crate::error::{ProvisionError, ProvisionResult};

/// Drives scale actions through persisted stages on a [`CloudProvider`].
pub struct StagedProvisioner<C> {
    cloud: C,
}

impl<C: CloudProvider> StagedProvisioner<C> {
    pub fn new(cloud: C) -> Self {
        Self { cloud }
    }

    pub fn cloud(&self) -> &C {
        &self.cloud
    }

    async fn run_scale_out(
        &self,
        cluster: &ClusterDetails,
        state: &StateManager,
    ) -> ProvisionResult<()> {
        expect_operation(&state.cached().await, Operation::ScalingUp)?;
        let mut current = state.start_attempt().await?;

        loop {
            current = match current.stage {
                Stage::Pending if current.node_delta == 0 => break,
                Stage::Pending => {
                    let existing = self.cloud.node_count(cluster).await?;
                    let max = cluster.cluster.number_max_nodes_allowed;
                    if existing.saturating_add(current.node_delta) > max {
                        return Err(ProvisionError::CapacityExceeded {
                            current: existing,
                            requested: current.node_delta,
                            max,
                        });
                    }
                    let launched = self.cloud.launch_nodes(cluster, current.node_delta).await?;
                    state.advance(Stage::NodesLaunched, launched).await?
                }
                Stage::NodesLaunched => {
                    self.cloud.await_join(cluster, &current.nodes).await?;
                    state.advance(Stage::NodesJoined, current.nodes.clone()).await?
                }
                Stage::NodesJoined => break,
                stage => {
                    return Err(ProvisionError::WrongStage {
                        operation: current.operation,
                        stage,
                    });
                }
            };
        }

        state.complete().await?;
        Ok(())
    }

    async fn run_scale_in(
        &self,
        cluster: &ClusterDetails,
        state: &StateManager,
    ) -> ProvisionResult<()> {
        expect_operation(&state.cached().await, Operation::ScalingDown)?;
        let mut current = state.start_attempt().await?;

        loop {
            current = match current.stage {
                Stage::Pending if current.node_delta == 0 => break,
                Stage::Pending => {
                    let existing = self.cloud.node_count(cluster).await?;
                    if current.node_delta >= existing {
                        return Err(ProvisionError::BelowMinimum {
                            current: existing,
                            requested: current.node_delta,
                        });
                    }
                    let drained = self.cloud.drain_nodes(cluster, current.node_delta).await?;
                    state.advance(Stage::NodesDrained, drained).await?
                }
                Stage::NodesDrained => {
                    self.cloud.terminate_nodes(cluster, &current.nodes).await?;
                    state.advance(Stage::NodesTerminated, current.nodes.clone()).await?
                }
                Stage::NodesTerminated => break,
                stage => {
                    return Err(ProvisionError::WrongStage {
                        operation: current.operation,
                        stage,
                    });
                }
            };
        }

        state.complete().await?;
        Ok(())
    }

    async fn finish(
        &self,
        label: &str,
        result: ProvisionResult<()>,
        user: &UserConfig,
        state: &StateManager,
    ) -> bool {
        let err = match result {
            Ok(()) => {
                info!(action = label, "provisioning finished");
                return true;
            }
            Err(e) => e,
        };

        let keep = user.failure_policy == FailurePolicy::Retain;
        warn!(
            action = label,
            error = %err,
            policy = ?user.failure_policy,
            "provisioning failed"
        );
        if let Err(store_err) = state.record_failure(&err.to_string(), keep).await {
            error!(
                action = label,
                error = %store_err,
                "could not record provisioning failure"
            );
        }
        false
    }
}

fn expect_operation(state: &OperationState, expected: Operation) -> ProvisionResult<()> {
    if state.operation == expected {
        Ok(())
    } else {
        Err(ProvisionError::WrongOperation {
            expected,
            found: state.operation,
        })
    }
}

#[async_trait]
impl<C: CloudProvider> Provisioner for StagedProvisioner<C> {
    async fn scale_out(
        &self,
        cluster: &ClusterDetails,
        user: &UserConfig,
        state: &StateManager,
    ) -> bool {
        let result = self.run_scale_out(cluster, state).await;
        self.finish("scale_out", result, user, state).await
    }

    async fn scale_in(
        &self,
        cluster: &ClusterDetails,
        user: &UserConfig,
        state: &StateManager,
    ) -> bool {
        let result = self.run_scale_in(cluster, state).await;
        self.finish("scale_in", result, user, state).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cloud::SimulatedCloud;
    use crate::cloud::tests::test_cluster;
    use searchscale_core::ScaleAction;
    use searchscale_state::{DocumentStore, RedbStore};

    fn user(policy: FailurePolicy) -> UserConfig {
        UserConfig {
            monitor_with_logs: false,
            monitor_with_simulator: true,
            purge_old_docs_after_hours: 72,
            polling_interval_in_secs: 1,
            failure_policy: policy,
            store_timeout_secs: 1,
            max_store_failures: 3,
            simulator_url: "http://localhost:5000".to_string(),
        }
    }

    fn manager() -> (RedbStore, StateManager) {
        let store = RedbStore::open_in_memory().unwrap();
        let mgr = StateManager::new(Arc::new(store.clone()), "node-cluster-1");
        (store, mgr)
    }

    #[tokio::test]
    async fn scale_out_completes_and_returns_to_idle() {
        let (store, state) = manager();
        let provisioner = StagedProvisioner::new(SimulatedCloud::new(2));
        let cluster = test_cluster(5);

        state.begin(ScaleAction::up(2), "scale_up_by_2").await.unwrap();
        assert!(provisioner.scale_out(&cluster, &user(FailurePolicy::Rollback), &state).await);

        assert_eq!(provisioner.cloud().active_nodes().len(), 4);
        let doc = store.get(state.key()).await.unwrap().unwrap();
        assert_eq!(doc["operation"], "idle");
    }

    #[tokio::test]
    async fn scale_in_completes() {
        let (_store, state) = manager();
        let provisioner = StagedProvisioner::new(SimulatedCloud::new(3));
        let cluster = test_cluster(5);

        state.begin(ScaleAction::down(1), "scale_down_by_1").await.unwrap();
        assert!(provisioner.scale_in(&cluster, &user(FailurePolicy::Rollback), &state).await);

        assert_eq!(provisioner.cloud().active_nodes().len(), 2);
        assert!(state.refresh().await.unwrap().is_idle());
    }

    #[tokio::test]
    async fn resume_skips_recorded_stages() {
        let (_store, state) = manager();
        let cloud = SimulatedCloud::new(1);
        let cluster = test_cluster(5);

        // A previous leader launched two nodes and died before they joined.
        let launched = cloud.launch_nodes(&cluster, 2).await.unwrap();
        state.begin(ScaleAction::up(2), "scale_up_by_2").await.unwrap();
        state.advance(Stage::NodesLaunched, launched).await.unwrap();

        let provisioner = StagedProvisioner::new(cloud);
        assert!(provisioner.scale_out(&cluster, &user(FailurePolicy::Rollback), &state).await);

        // No extra nodes were launched on resume.
        assert_eq!(provisioner.cloud().active_nodes().len(), 3);
        assert!(state.cached().await.is_idle());
    }

    #[tokio::test]
    async fn scale_in_resume_terminates_recorded_nodes() {
        let (_store, state) = manager();
        let cloud = SimulatedCloud::new(3);
        let cluster = test_cluster(5);

        let drained = cloud.drain_nodes(&cluster, 1).await.unwrap();
        state.begin(ScaleAction::down(1), "scale_down_by_1").await.unwrap();
        state.advance(Stage::NodesDrained, drained).await.unwrap();

        let provisioner = StagedProvisioner::new(cloud);
        assert!(provisioner.scale_in(&cluster, &user(FailurePolicy::Rollback), &state).await);
        assert_eq!(provisioner.cloud().active_nodes(), vec!["sim-node-1", "sim-node-2"]);
    }

    #[tokio::test]
    async fn capacity_exceeded_rolls_back() {
        let (_store, state) = manager();
        let provisioner = StagedProvisioner::new(SimulatedCloud::new(4));

        state.begin(ScaleAction::up(2), "scale_up_by_2").await.unwrap();
        let ok = provisioner
            .scale_out(&test_cluster(5), &user(FailurePolicy::Rollback), &state)
            .await;

        assert!(!ok);
        let after = state.refresh().await.unwrap();
        assert!(after.is_idle());
        assert!(after.last_error.unwrap().contains("exceeds the limit"));
        assert_eq!(provisioner.cloud().active_nodes().len(), 4);
    }

    #[tokio::test]
    async fn retain_policy_keeps_operation() {
        let (_store, state) = manager();
        let provisioner = StagedProvisioner::new(SimulatedCloud::new(1));

        state.begin(ScaleAction::down(1), "scale_down_by_1").await.unwrap();
        let ok = provisioner
            .scale_in(&test_cluster(5), &user(FailurePolicy::Retain), &state)
            .await;

        assert!(!ok);
        let after = state.refresh().await.unwrap();
        assert_eq!(after.operation, Operation::ScalingDown);
        assert_eq!(after.attempts, 1);
        assert!(after.last_error.is_some());
    }

    #[tokio::test]
    async fn zero_delta_completes_immediately() {
        let (_store, state) = manager();
        let provisioner = StagedProvisioner::new(SimulatedCloud::new(2));

        state.begin(ScaleAction::down(0), "scale_down_by_0").await.unwrap();
        assert!(provisioner
            .scale_in(&test_cluster(5), &user(FailurePolicy::Rollback), &state)
            .await);
        assert_eq!(provisioner.cloud().active_nodes().len(), 2);
        assert!(state.cached().await.is_idle());
    }

    #[tokio::test]
    async fn wrong_operation_fails() {
        let (_store, state) = manager();
        let provisioner = StagedProvisioner::new(SimulatedCloud::new(2));

        state.refresh().await.unwrap();
        let ok = provisioner
            .scale_out(&test_cluster(5), &user(FailurePolicy::Retain), &state)
            .await;
        assert!(!ok);
        assert!(state.cached().await.is_idle());
    }
}
