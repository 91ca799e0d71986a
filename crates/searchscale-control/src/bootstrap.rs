//! Daemon startup and the two-loop runtime.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use searchscale_core::{ConfigSource, ScalerConfig};
use searchscale_provision::{Provisioner, SimulatedCloud, StagedProvisioner};
use searchscale_state::{DocumentStore, OpenSearchStore, RedbStore, StateManager};

use crate::context::ControlContext;
use crate::error::{ControlError, InitError};
use crate::leader::{LeadershipOracle, OpenSearchLeadership};
use crate::main_loop::MainLoop;
use crate::metrics::{OpenSearchMetrics, SimulatorMetrics};
use crate::recommend::{RecommendationSource, RuleEvaluator};
use crate::recovery::RecoveryLoop;

/// External collaborators built from a validated configuration.
pub struct Components {
    pub store: Arc<dyn DocumentStore>,
    pub leadership: Arc<dyn LeadershipOracle>,
    pub recommender: Arc<dyn RecommendationSource>,
    pub provisioner: Arc<dyn Provisioner>,
}

/// Builds [`Components`]. Only called once the configuration is valid.
pub trait ComponentFactory {
    fn build(&self, config: &ScalerConfig) -> Result<Components, InitError>;
}

/// Production wiring: OpenSearch for state, leadership and live metrics,
/// the load simulator for simulated metrics, and a simulated cloud.
pub struct OpenSearchComponents {
    /// Size of the simulated cloud's initial node pool.
    pub simulated_nodes: u32,
    /// Keep the Operation State in a local redb file instead of OpenSearch.
    /// Only safe when a single process manages the cluster.
    pub state_db: Option<PathBuf>,
}

fn component_error(component: &'static str) -> impl Fn(anyhow::Error) -> InitError {
    move |e| InitError::Component {
        component,
        reason: format!("{e:#}"),
    }
}

impl ComponentFactory for OpenSearchComponents {
    fn build(&self, config: &ScalerConfig) -> Result<Components, InitError> {
        let cluster = &config.cluster_details;
        let creds = &cluster.os_credentials;
        let timeout = config.user_config.store_timeout();

        let store: Arc<dyn DocumentStore> = match &self.state_db {
            Some(path) => {
                info!(path = %path.display(), "operation state kept in local redb file");
                Arc::new(RedbStore::open(path)?)
            }
            None => Arc::new(OpenSearchStore::new(
                &cluster.opensearch_url,
                &creds.os_admin_username,
                &creds.os_admin_password,
                timeout,
            )?),
        };
        let leadership = OpenSearchLeadership::new(
            &cluster.opensearch_url,
            &creds.os_admin_username,
            &creds.os_admin_password,
            timeout,
        )
        .map_err(component_error("leadership oracle"))?;
        let simulator = SimulatorMetrics::new(&config.user_config.simulator_url, timeout)
            .map_err(component_error("simulator metrics"))?;
        let live = OpenSearchMetrics::new(
            &cluster.opensearch_url,
            &creds.os_admin_username,
            &creds.os_admin_password,
            timeout,
        )
        .map_err(component_error("opensearch metrics"))?;

        Ok(Components {
            store,
            leadership: Arc::new(leadership),
            recommender: Arc::new(RuleEvaluator::new(Arc::new(simulator), Arc::new(live))),
            provisioner: Arc::new(StagedProvisioner::new(SimulatedCloud::new(
                self.simulated_nodes,
            ))),
        })
    }
}

/// An initialized daemon, ready to run.
pub struct Daemon {
    pub context: Arc<ControlContext>,
    pub interval: Duration,
    pub max_store_failures: u32,
}

impl Daemon {
    pub fn main_loop(&self) -> MainLoop {
        MainLoop::new(self.context.clone(), self.max_store_failures)
    }

    pub fn recovery_loop(&self) -> RecoveryLoop {
        RecoveryLoop::new(self.context.clone(), self.max_store_failures)
    }
}

/// Load and validate configuration, then build the shared context.
///
/// Configuration errors are returned before any collaborator is built, so
/// an invalid file never touches the store. Index creation is best-effort.
pub async fn initialize(
    source: Arc<dyn ConfigSource>,
    factory: &dyn ComponentFactory,
) -> Result<Daemon, InitError> {
    let config = source.load()?;
    let cluster_id = config.cluster_details.cluster_id().to_string();
    info!(
        cluster = %cluster_id,
        tasks = config.task_details.len(),
        mode = ?config.user_config.monitor_mode(),
        policy = ?config.user_config.failure_policy,
        "configuration loaded"
    );

    let components = factory.build(&config)?;
    let timeout = config.user_config.store_timeout();
    let state = StateManager::new(components.store, &cluster_id).with_timeout(timeout);
    if let Err(e) = state.ensure_index().await {
        warn!(error = %e, "could not ensure state index, continuing");
    }
    info!(cluster = %cluster_id, key = %state.key(), "operation state bound");

    let context = ControlContext::new(
        Arc::new(state),
        components.leadership,
        components.recommender,
        components.provisioner,
        source,
    )
    .with_leader_timeout(timeout);

    Ok(Daemon {
        context: Arc::new(context),
        interval: config.user_config.polling_interval(),
        max_store_failures: config.user_config.max_store_failures,
    })
}

/// Run both loops until shutdown. If either loop stops with an error the
/// other is aborted and the error returned.
pub async fn run(daemon: Daemon, shutdown: watch::Receiver<bool>) -> Result<(), ControlError> {
    let mut main = tokio::spawn(daemon.main_loop().run(daemon.interval, shutdown.clone()));
    let mut recovery = tokio::spawn(daemon.recovery_loop().run(daemon.interval, shutdown));

    let (first, main_finished) = tokio::select! {
        result = &mut main => (result, true),
        result = &mut recovery => (result, false),
    };
    let other = if main_finished { recovery } else { main };

    match first {
        Ok(Ok(())) => match other.await {
            Ok(result) => result,
            Err(e) => Err(ControlError::Task(e.to_string())),
        },
        Ok(Err(e)) => {
            error!(error = %e, "control loop stopped");
            other.abort();
            Err(e)
        }
        Err(e) => {
            other.abort();
            Err(ControlError::Task(e.to_string()))
        }
    }
}
