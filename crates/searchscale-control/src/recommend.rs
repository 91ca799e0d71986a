//! Recommendation source: turns configured tasks into scale actions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use searchscale_core::{MonitorMode, Rule, RuleOperator, ScaleAction, ScaleDirection, Task};

use crate::metrics::MetricSource;

/// A scale action proposed by a task whose rules fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub task_name: String,
    pub action: ScaleAction,
}

/// Produces the recommendations for one main-loop tick.
///
/// The main loop acts on the first entry; order follows the task list.
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn recommend(
        &self,
        tasks: &[Task],
        mode: MonitorMode,
    ) -> anyhow::Result<Vec<Recommendation>>;
}

/// Evaluates task rules against a metric source chosen by monitor mode.
pub struct RuleEvaluator {
    simulator: Arc<dyn MetricSource>,
    live: Arc<dyn MetricSource>,
}

impl RuleEvaluator {
    pub fn new(simulator: Arc<dyn MetricSource>, live: Arc<dyn MetricSource>) -> Self {
        Self { simulator, live }
    }

    fn source(&self, mode: MonitorMode) -> &dyn MetricSource {
        match mode {
            MonitorMode::Simulator => self.simulator.as_ref(),
            MonitorMode::Live => self.live.as_ref(),
        }
    }

    /// Whether a single rule holds. A metric that cannot be read never
    /// satisfies a rule.
    async fn rule_holds(
        &self,
        source: &dyn MetricSource,
        rule: &Rule,
        direction: ScaleDirection,
    ) -> bool {
        let value = match source.stat(&rule.metric, rule.stat, rule.decision_period).await {
            Ok(v) => v,
            Err(e) => {
                warn!(metric = %rule.metric, error = %e, "metric unavailable");
                return false;
            }
        };
        let holds = match direction {
            ScaleDirection::Up => value > rule.limit,
            ScaleDirection::Down => value < rule.limit,
        };
        debug!(
            metric = %rule.metric,
            value,
            limit = rule.limit,
            %direction,
            holds,
            "rule evaluated"
        );
        holds
    }

    async fn task_fires(
        &self,
        source: &dyn MetricSource,
        task: &Task,
        direction: ScaleDirection,
    ) -> bool {
        if task.rules.is_empty() {
            return false;
        }
        match task.operator {
            RuleOperator::And => {
                for rule in &task.rules {
                    if !self.rule_holds(source, rule, direction).await {
                        return false;
                    }
                }
                true
            }
            RuleOperator::Or => {
                for rule in &task.rules {
                    if self.rule_holds(source, rule, direction).await {
                        return true;
                    }
                }
                false
            }
        }
    }
}

#[async_trait]
impl RecommendationSource for RuleEvaluator {
    async fn recommend(
        &self,
        tasks: &[Task],
        mode: MonitorMode,
    ) -> anyhow::Result<Vec<Recommendation>> {
        let source = self.source(mode);
        let mut fired = Vec::new();
        for task in tasks {
            let Some(action) = task.action() else {
                warn!(task = %task.task_name, "task name does not encode a scale action");
                continue;
            };
            if self.task_fires(source, task, action.direction).await {
                debug!(task = %task.task_name, "task fired");
                fired.push(Recommendation {
                    task_name: task.task_name.clone(),
                    action,
                });
            }
        }
        Ok(fired)
    }
}
