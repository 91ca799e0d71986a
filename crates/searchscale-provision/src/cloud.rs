//! Cloud provider boundary and an in-memory simulation of it.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use searchscale_core::ClusterDetails;

use crate::error::{ProvisionError, ProvisionResult};

/// Node lifecycle calls against the infrastructure hosting the cluster.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Nodes currently serving or joining the cluster.
    async fn node_count(&self, cluster: &ClusterDetails) -> ProvisionResult<u32>;

    /// Start `count` new nodes and return their ids.
    async fn launch_nodes(&self, cluster: &ClusterDetails, count: u32)
        -> ProvisionResult<Vec<String>>;

    /// Wait until the given nodes have joined the cluster.
    async fn await_join(&self, cluster: &ClusterDetails, nodes: &[String]) -> ProvisionResult<()>;

    /// Move shards off `count` nodes and return the drained node ids.
    async fn drain_nodes(&self, cluster: &ClusterDetails, count: u32)
        -> ProvisionResult<Vec<String>>;

    /// Shut down the given nodes. Already-terminated nodes are ignored.
    async fn terminate_nodes(&self, cluster: &ClusterDetails, nodes: &[String])
        -> ProvisionResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Joining,
    Active,
    Draining,
}

#[derive(Debug, Clone)]
struct SimNode {
    id: String,
    status: NodeStatus,
}

/// Cloud provider that only tracks nodes in memory.
#[derive(Debug)]
pub struct SimulatedCloud {
    nodes: Mutex<Vec<SimNode>>,
    next_id: AtomicU32,
}

impl SimulatedCloud {
    /// Start with `initial` active nodes.
    pub fn new(initial: u32) -> Self {
        let nodes = (1..=initial)
            .map(|i| SimNode {
                id: format!("sim-node-{i}"),
                status: NodeStatus::Active,
            })
            .collect();
        Self {
            nodes: Mutex::new(nodes),
            next_id: AtomicU32::new(initial + 1),
        }
    }

    /// Ids of active nodes.
    pub fn active_nodes(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|n| n.status == NodeStatus::Active)
            .map(|n| n.id.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SimNode>> {
        // A poisoned list is still a valid list.
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CloudProvider for SimulatedCloud {
    async fn node_count(&self, _cluster: &ClusterDetails) -> ProvisionResult<u32> {
        let count = self
            .lock()
            .iter()
            .filter(|n| n.status != NodeStatus::Draining)
            .count();
        Ok(count as u32)
    }

    async fn launch_nodes(
        &self,
        cluster: &ClusterDetails,
        count: u32,
    ) -> ProvisionResult<Vec<String>> {
        let mut nodes = self.lock();
        let launched: Vec<String> = (0..count)
            .map(|_| format!("sim-node-{}", self.next_id.fetch_add(1, Ordering::Relaxed)))
            .collect();
        nodes.extend(launched.iter().map(|id| SimNode {
            id: id.clone(),
            status: NodeStatus::Joining,
        }));
        info!(
            cluster = %cluster.cluster_id(),
            node_type = %cluster.cluster.base_node_type,
            ?launched,
            "simulated nodes launched"
        );
        Ok(launched)
    }

    async fn await_join(&self, cluster: &ClusterDetails, ids: &[String]) -> ProvisionResult<()> {
        let mut nodes = self.lock();
        for id in ids {
            let node = nodes
                .iter_mut()
                .find(|n| &n.id == id)
                .ok_or_else(|| ProvisionError::UnknownNode(id.clone()))?;
            node.status = NodeStatus::Active;
        }
        debug!(cluster = %cluster.cluster_id(), ?ids, "simulated nodes joined");
        Ok(())
    }

    async fn drain_nodes(
        &self,
        cluster: &ClusterDetails,
        count: u32,
    ) -> ProvisionResult<Vec<String>> {
        let mut nodes = self.lock();
        let active = nodes.iter().filter(|n| n.status == NodeStatus::Active).count() as u32;
        if active < count {
            return Err(ProvisionError::Cloud(format!(
                "only {active} of {count} nodes can be drained"
            )));
        }
        let mut drained = Vec::new();
        for node in nodes.iter_mut().rev() {
            if drained.len() as u32 == count {
                break;
            }
            if node.status == NodeStatus::Active {
                node.status = NodeStatus::Draining;
                drained.push(node.id.clone());
            }
        }
        info!(cluster = %cluster.cluster_id(), ?drained, "simulated nodes drained");
        Ok(drained)
    }

    async fn terminate_nodes(
        &self,
        cluster: &ClusterDetails,
        ids: &[String],
    ) -> ProvisionResult<()> {
        self.lock().retain(|n| !ids.contains(&n.id));
        info!(cluster = %cluster.cluster_id(), ?ids, "simulated nodes terminated");
        Ok(())
    }
}
