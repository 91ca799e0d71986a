//! Scaling tasks and the actions they encode.
//!
//! A task's name carries its direction and magnitude
//! (`scale_up_by_2`, `scale_down_by_1`); its rules decide when it fires.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

fn task_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^scale_(up|down)_by_([0-9]+)$").expect("task name regex"))
}

/// Check a task name against `scale_(up|down)_by_<digits>`.
///
/// `scale_down_by_0` passes: the pattern only requires digits.
pub fn is_valid_task_name(name: &str) -> bool {
    task_name_re().is_match(name)
}

/// Direction of a scale action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleDirection::Up => f.write_str("up"),
            ScaleDirection::Down => f.write_str("down"),
        }
    }
}

/// A concrete decision to add or remove nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleAction {
    pub direction: ScaleDirection,
    pub nodes: u32,
}

impl ScaleAction {
    pub fn up(nodes: u32) -> Self {
        Self {
            direction: ScaleDirection::Up,
            nodes,
        }
    }

    pub fn down(nodes: u32) -> Self {
        Self {
            direction: ScaleDirection::Down,
            nodes,
        }
    }
}

/// How a task combines its rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RuleOperator {
    #[serde(rename = "AND")]
    And,
    #[default]
    #[serde(rename = "OR")]
    Or,
}

/// Statistic computed over a rule's decision period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Stat {
    #[default]
    #[serde(rename = "AVG")]
    Avg,
    #[serde(rename = "COUNT")]
    Count,
}

/// A single threshold rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Metric name as collected, e.g. `CpuUtil`, `RamUtil`, `HeapUtil`.
    pub metric: String,
    /// Threshold compared against the computed statistic.
    pub limit: f64,
    #[serde(default)]
    pub stat: Stat,
    /// Window in minutes over which the statistic is computed.
    #[serde(default = "default_decision_period")]
    pub decision_period: u32,
}

fn default_decision_period() -> u32 {
    10
}

/// A named scaling rule set from `task_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_name: String,
    #[serde(default)]
    pub operator: RuleOperator,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Task {
    /// The scale action encoded in the task name.
    ///
    /// Returns `None` if the name does not match the pattern or the
    /// magnitude does not fit in a `u32`.
    pub fn action(&self) -> Option<ScaleAction> {
        let caps = task_name_re().captures(&self.task_name)?;
        let nodes = caps[2].parse::<u32>().ok()?;
        match &caps[1] {
            "up" => Some(ScaleAction::up(nodes)),
            "down" => Some(ScaleAction::down(nodes)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str) -> Task {
        Task {
            task_name: name.to_string(),
            operator: RuleOperator::Or,
            rules: Vec::new(),
        }
    }

    #[test]
    fn task_name_validation() {
        assert!(is_valid_task_name("scale_up_by_5"));
        assert!(is_valid_task_name("scale_down_by_12"));
        assert!(!is_valid_task_name("scaleup5"));
        assert!(!is_valid_task_name("scale_sideways_by_5"));
        assert!(!is_valid_task_name("scale_up_by_"));
        assert!(!is_valid_task_name("xscale_up_by_5"));
        assert!(!is_valid_task_name("scale_up_by_5x"));
    }

    #[test]
    fn zero_magnitude_is_accepted_by_pattern() {
        assert!(is_valid_task_name("scale_down_by_0"));
        assert_eq!(task("scale_down_by_0").action(), Some(ScaleAction::down(0)));
    }

    #[test]
    fn action_from_name() {
        assert_eq!(task("scale_up_by_3").action(), Some(ScaleAction::up(3)));
        assert_eq!(task("scale_down_by_1").action(), Some(ScaleAction::down(1)));
        assert_eq!(task("scale_sideways_by_1").action(), None);
    }

    #[test]
    fn oversized_magnitude_has_no_action() {
        assert_eq!(task("scale_up_by_99999999999").action(), None);
    }

    #[test]
    fn rule_defaults() {
        let yaml = "task_name: scale_up_by_1\nrules:\n  - metric: CpuUtil\n    limit: 80\n";
        let task: Task = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.operator, RuleOperator::Or);
        assert_eq!(task.rules[0].stat, Stat::Avg);
        assert_eq!(task.rules[0].decision_period, 10);
    }
}
