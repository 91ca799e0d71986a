//! searchscale-provision: execution of approved scale actions.
//!
//! The control loops call a [`Provisioner`] once an operation has been
//! recorded in the Operation State. The bundled [`StagedProvisioner`]
//! splits each action into persisted stages so that a new leader can
//! resume a half-finished operation instead of repeating it.
//!
//! ```text
//! scale out:  Pending ─launch─▶ NodesLaunched ─join─▶ NodesJoined ─▶ Idle
//! scale in:   Pending ─drain──▶ NodesDrained ─terminate─▶ NodesTerminated ─▶ Idle
//! ```
//!
//! Cloud calls go through the [`CloudProvider`] trait; [`SimulatedCloud`]
//! keeps an in-memory node list.

pub mod cloud;
pub mod error;
pub mod staged;

use async_trait::async_trait;

use searchscale_core::{ClusterDetails, UserConfig};
use searchscale_state::StateManager;

pub use cloud::{CloudProvider, SimulatedCloud};
pub use error::{ProvisionError, ProvisionResult};
pub use staged::StagedProvisioner;

/// Executes scale actions recorded in the Operation State.
///
/// On success the state must be back at `Idle` and persisted. On failure
/// the implementation leaves the state as its failure policy dictates and
/// returns `false`; it never panics the calling loop.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Add nodes for a `ScalingUp` operation.
    async fn scale_out(
        &self,
        cluster: &ClusterDetails,
        user: &UserConfig,
        state: &StateManager,
    ) -> bool;

    /// Remove nodes for a `ScalingDown` operation.
    async fn scale_in(
        &self,
        cluster: &ClusterDetails,
        user: &UserConfig,
        state: &StateManager,
    ) -> bool;
}
