//! RecoveryLoop: resumes an in-flight operation after a leadership change.
//!
//! Resumption is edge-triggered: it happens on the tick where this process
//! goes from follower to leader, or on the very first tick if the process
//! starts as leader. A leader that stays leader never resumes again; its
//! own main loop is responsible for anything it started.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use searchscale_state::{Operation, StateError};

use crate::budget::FailureBudget;
use crate::context::ControlContext;
use crate::error::ControlError;

/// What a single recovery tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryTick {
    /// Nothing in flight.
    Idle,
    /// Not leader on this tick.
    NotLeader,
    /// Still leader from the previous tick; nothing to resume.
    NoTransition,
    /// Leadership was gained but the configuration could not be reloaded.
    ConfigError,
    /// Leadership was gained while the main loop is provisioning.
    Executing,
    /// The recorded operation was handed back to the provisioner.
    Resumed { operation: Operation, success: bool },
    /// The store could not be reached; the tick was skipped.
    StoreError,
}

pub struct RecoveryLoop {
    ctx: Arc<ControlContext>,
    previous_leader: bool,
    first_tick: bool,
    budget: FailureBudget,
}

impl RecoveryLoop {
    pub fn new(ctx: Arc<ControlContext>, max_store_failures: u32) -> Self {
        Self {
            ctx,
            previous_leader: false,
            first_tick: true,
            budget: FailureBudget::new(max_store_failures),
        }
    }

    /// Run one recovery check.
    ///
    /// A tick whose state refresh fails leaves the leadership memory
    /// untouched, so a transition that happens during a store outage is
    /// still seen once the store is back.
    pub async fn tick(&mut self) -> Result<RecoveryTick, ControlError> {
        let ctx = self.ctx.clone();
        let state = match ctx.refresh_state().await {
            Ok(state) => {
                self.budget.record_success();
                state
            }
            Err(e) => return self.store_failure(e),
        };

        let leader = ctx.is_leader().await;
        let gained = leader && (!self.previous_leader || self.first_tick);
        if leader != self.previous_leader {
            info!(leader, "leadership changed");
        }
        self.previous_leader = leader;
        self.first_tick = false;

        let Some(direction) = state.operation.direction() else {
            return Ok(RecoveryTick::Idle);
        };
        if !leader {
            return Ok(RecoveryTick::NotLeader);
        }
        if !gained {
            debug!(operation = ?state.operation, "still leader, not resuming");
            return Ok(RecoveryTick::NoTransition);
        }

        info!(
            operation = ?state.operation,
            stage = ?state.stage,
            attempts = state.attempts,
            "leadership gained with operation in flight"
        );

        let config = match ctx.config.load() {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "config reload failed, operation not resumed");
                return Ok(RecoveryTick::ConfigError);
            }
        };

        let Some(_guard) = ctx.try_execute() else {
            warn!("provisioning already running in this process, not resuming");
            return Ok(RecoveryTick::Executing);
        };

        let success = ctx.dispatch(direction, &config).await;
        info!(operation = ?state.operation, success, "operation resumed");
        Ok(RecoveryTick::Resumed {
            operation: state.operation,
            success,
        })
    }

    fn store_failure(&mut self, e: StateError) -> Result<RecoveryTick, ControlError> {
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
            "store error, skipping recovery tick"
        );
        Ok(RecoveryTick::StoreError)
    }

    /// Tick every `interval` until shutdown or an unrecoverable error.
    pub async fn run(
        mut self,
        interval: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), ControlError> {
        info!(interval_secs = interval.as_secs(), "recovery loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let outcome = self.tick().await?;
                    debug!(?outcome, "recovery tick");
                }
                _ = shutdown.changed() => {
                    info!("recovery loop shutting down");
                    return Ok(());
                }
            }
        }
    }
}
