//! MainLoop: leader-gated scaling decisions.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, warn};

use searchscale_state::{Operation, StateError};

use crate::budget::FailureBudget;
use crate::context::ControlContext;
use crate::error::ControlError;

/// What a single main-loop tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainTick {
    /// Another process is leader.
    NotLeader,
    /// An operation is already in flight.
    Busy(Operation),
    /// The configuration could not be reloaded; nothing was decided.
    ConfigError,
    /// The recovery loop is provisioning in this process.
    Executing,
    /// No task fired.
    NoRecommendation,
    /// An action was recorded and handed to the provisioner.
    Provisioned { operation: Operation, success: bool },
    /// The store could not be reached; the tick was skipped.
    StoreError,
}

/// Periodically turns recommendations into recorded, executed operations.
pub struct MainLoop {
    ctx: Arc<ControlContext>,
    budget: FailureBudget,
}

impl MainLoop {
    pub fn new(ctx: Arc<ControlContext>, max_store_failures: u32) -> Self {
        Self {
            ctx,
            budget: FailureBudget::new(max_store_failures),
        }
    }

    /// Run one decision cycle.
    ///
    /// Returns an error only once the store failure budget is exhausted.
    pub async fn tick(&mut self) -> Result<MainTick, ControlError> {
        let ctx = self.ctx.clone();
        let state = match ctx.refresh_state().await {
            Ok(state) => {
                self.budget.record_success();
                state
            }
            Err(e) => return self.store_failure(e),
        };

        if !ctx.is_leader().await {
            debug!("not leader, skipping decision");
            return Ok(MainTick::NotLeader);
        }
        if !state.is_idle() {
            debug!(operation = ?state.operation, stage = ?state.stage, "operation in flight");
            return Ok(MainTick::Busy(state.operation));
        }

        let config = match ctx.config.load() {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "config reload failed, skipping tick");
                return Ok(MainTick::ConfigError);
            }
        };

        let Some(_guard) = ctx.try_execute() else {
            debug!("recovery in progress, skipping decision");
            return Ok(MainTick::Executing);
        };

        let recommendations = match ctx
            .recommender
            .recommend(&config.task_details, config.user_config.monitor_mode())
            .await
        {
            Ok(recs) => recs,
            Err(e) => {
                warn!(error = %e, "recommendation failed");
                return Ok(MainTick::NoRecommendation);
            }
        };
        let Some(rec) = recommendations.into_iter().next() else {
            debug!("no task fired");
            return Ok(MainTick::NoRecommendation);
        };

        let since = epoch_secs();
        if let Err(e) = ctx.state.begin(rec.action, &rec.task_name).await {
            // The write may have landed despite the error. A stored record
            // that is still ours is executed now; recovery would not pick it up
            // without a leadership change.
            match ctx.refresh_state().await {
                Ok(stored) if stored.is_fresh_begin(rec.action, &rec.task_name, since) => {
                    warn!(
                        task = %rec.task_name,
                        error = %e,
                        "begin reported failure but the record was stored, executing"
                    );
                }
                _ => return self.store_failure(e),
            }
        }

        let operation = Operation::from_direction(rec.action.direction);
        let success = ctx.dispatch(rec.action.direction, &config).await;
        info!(task = %rec.task_name, ?operation, success, "scaling decision executed");
        Ok(MainTick::Provisioned { operation, success })
    }

    fn store_failure(&mut self, e: StateError) -> Result<MainTick, ControlError> {
        if self.budget.record_failure() {
            error!(
                failures = self.budget.consecutive(),
                error = %e,
                "document store unavailable, giving up"
            );
            return Err(ControlError::StoreUnavailable {
                failures: self.budget.consecutive(),
                source: e,
            });
        }
        warn!(
            failures = self.budget.consecutive(),
            error = %e,
            "store error, skipping tick"
        );
        Ok(MainTick::StoreError)
    }

    /// Tick every `interval` until shutdown or an unrecoverable error.
    pub async fn run(
        mut self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), ControlError> {
        info!(interval_secs = interval.as_secs(), "main loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let outcome = self.tick().await?;
                    debug!(?outcome, "main tick");
                }
                _ = shutdown.changed() => {
                    info!("main loop shutting down");
                    return Ok(());
                }
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
