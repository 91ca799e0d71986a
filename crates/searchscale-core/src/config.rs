//! YAML configuration model and validation.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::task::{Task, is_valid_task_name};

fn cluster_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9\-._]+[A-Za-z0-9]$").expect("cluster name regex")
    })
}

/// Check a cluster name: a letter first, alphanumeric last, at least
/// three characters.
pub fn is_valid_cluster_name(name: &str) -> bool {
    cluster_name_re().is_match(name)
}

/// The complete configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalerConfig {
    pub user_config: UserConfig,
    pub cluster_details: ClusterDetails,
    #[serde(default)]
    pub task_details: Vec<Task>,
}

/// What to do with the Operation State when a provisioning action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abandon the attempt and return to `Idle`.
    #[default]
    Rollback,
    /// Keep the operation in place so the next leader resumes it.
    Retain,
}

/// Where recommendation inputs come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorMode {
    Simulator,
    Live,
}

/// Application behaviour chosen by the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    #[serde(default)]
    pub monitor_with_logs: bool,
    #[serde(default)]
    pub monitor_with_simulator: bool,
    #[serde(default = "default_purge_after")]
    pub purge_old_docs_after_hours: u32,
    #[serde(default = "default_polling_interval")]
    pub polling_interval_in_secs: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Per-call timeout for the document store and leadership queries.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,
    /// Consecutive failed ticks tolerated before the daemon gives up.
    #[serde(default = "default_max_store_failures")]
    pub max_store_failures: u32,
    #[serde(default = "default_simulator_url")]
    pub simulator_url: String,
}

fn default_purge_after() -> u32 {
    72
}

fn default_polling_interval() -> u64 {
    60
}

fn default_store_timeout() -> u64 {
    10
}

fn default_max_store_failures() -> u32 {
    5
}

fn default_simulator_url() -> String {
    "http://localhost:5000".to_string()
}

impl UserConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_in_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn monitor_mode(&self) -> MonitorMode {
        if self.monitor_with_simulator {
            MonitorMode::Simulator
        } else {
            MonitorMode::Live
        }
    }
}

/// Static description of the cluster being scaled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterStatic {
    pub cluster_name: String,
    #[serde(default)]
    pub cloud_type: String,
    #[serde(default)]
    pub base_node_type: String,
    #[serde(default)]
    pub number_cpus_per_node: u32,
    #[serde(default)]
    pub ram_per_node_in_gb: u32,
    #[serde(default)]
    pub disk_per_node_in_gb: u32,
    #[serde(default = "default_max_nodes")]
    pub number_max_nodes_allowed: u32,
}

fn default_max_nodes() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OsCredentials {
    pub os_admin_username: String,
    pub os_admin_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudCredentials {
    pub secret_key: String,
    pub access_key: String,
}

/// Cluster identity plus the credentials needed to reach it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterDetails {
    #[serde(flatten)]
    pub cluster: ClusterStatic,
    pub os_credentials: OsCredentials,
    pub cloud_credentials: CloudCredentials,
    #[serde(default = "default_opensearch_url")]
    pub opensearch_url: String,
}

fn default_opensearch_url() -> String {
    "http://localhost:9200".to_string()
}

impl ClusterDetails {
    /// Stable identity from which the state document key is derived.
    pub fn cluster_id(&self) -> &str {
        &self.cluster.cluster_name
    }
}

impl ScalerConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&content)?;
        debug!(path = %path.display(), tasks = config.task_details.len(), "config loaded");
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScalerConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every constraint, collecting all problems into one error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues = Vec::new();

        let name = self.cluster_details.cluster_id();
        if !is_valid_cluster_name(name) {
            issues.push(format!("cluster_name {name:?} is not a valid cluster name"));
        }

        let creds = &self.cluster_details.os_credentials;
        if creds.os_admin_username.is_empty() {
            issues.push("os_credentials.os_admin_username is required".to_string());
        }
        if creds.os_admin_password.is_empty() {
            issues.push("os_credentials.os_admin_password is required".to_string());
        }
        let cloud = &self.cluster_details.cloud_credentials;
        if cloud.secret_key.is_empty() {
            issues.push("cloud_credentials.secret_key is required".to_string());
        }
        if cloud.access_key.is_empty() {
            issues.push("cloud_credentials.access_key is required".to_string());
        }

        if self.user_config.polling_interval_in_secs == 0 {
            issues.push("polling_interval_in_secs must be greater than zero".to_string());
        }
        if self.user_config.store_timeout_secs == 0 {
            issues.push("store_timeout_secs must be greater than zero".to_string());
        }
        if self.user_config.max_store_failures == 0 {
            issues.push("max_store_failures must be greater than zero".to_string());
        }

        if self.task_details.is_empty() {
            issues.push("task_details must contain at least one task".to_string());
        }
        for task in &self.task_details {
            if !is_valid_task_name(&task.task_name) {
                issues.push(format!(
                    "task_name {:?} does not match scale_(up|down)_by_<n>",
                    task.task_name
                ));
            } else if task.action().is_none() {
                issues.push(format!(
                    "task_name {:?} has an out-of-range magnitude",
                    task.task_name
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::RuleOperator;

    const VALID: &str = r#"
user_config:
  monitor_with_logs: true
  monitor_with_simulator: true
  purge_old_docs_after_hours: 72
  polling_interval_in_secs: 30
cluster_details:
  cluster_name: node-cluster-1
  cloud_type: AWS
  base_node_type: t2.large
  number_cpus_per_node: 2
  ram_per_node_in_gb: 8
  disk_per_node_in_gb: 100
  number_max_nodes_allowed: 6
  os_credentials:
    os_admin_username: admin
    os_admin_password: admin
  cloud_credentials:
    secret_key: secret
    access_key: access
task_details:
  - task_name: scale_up_by_1
    operator: OR
    rules:
      - metric: CpuUtil
        limit: 80
        stat: AVG
        decision_period: 9
  - task_name: scale_down_by_1
    operator: AND
    rules:
      - metric: CpuUtil
        limit: 20
        stat: AVG
        decision_period: 9
"#;

    #[test]
    fn parse_valid() {
        let config = ScalerConfig::from_yaml_str(VALID).unwrap();
        assert_eq!(config.cluster_details.cluster_id(), "node-cluster-1");
        assert_eq!(config.cluster_details.cluster.number_max_nodes_allowed, 6);
        assert_eq!(config.cluster_details.opensearch_url, "http://localhost:9200");
        assert_eq!(config.user_config.polling_interval(), Duration::from_secs(30));
        assert_eq!(config.user_config.monitor_mode(), MonitorMode::Simulator);
        assert_eq!(config.user_config.failure_policy, FailurePolicy::Rollback);
        assert_eq!(config.task_details.len(), 2);
        assert_eq!(config.task_details[1].operator, RuleOperator::And);
    }

    #[test]
    fn failure_policy_parse() {
        let yaml = VALID.replace(
            "polling_interval_in_secs: 30",
            "polling_interval_in_secs: 30\n  failure_policy: retain",
        );
        let config = ScalerConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.user_config.failure_policy, FailurePolicy::Retain);
    }

    #[test]
    fn empty_task_list_rejected() {
        let yaml = format!("{}task_details: []\n", VALID.split("task_details:").next().unwrap());
        let err = ScalerConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.issues().iter().any(|i| i.contains("at least one task")));
    }

    #[test]
    fn bad_task_name_rejected() {
        let yaml = VALID.replace("scale_down_by_1", "scale_sideways_by_1");
        let err = ScalerConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert!(err.issues()[0].contains("scale_sideways_by_1"));
    }

    #[test]
    fn cluster_names() {
        assert!(is_valid_cluster_name("node-cluster-1"));
        assert!(is_valid_cluster_name("prod.search_2"));
        assert!(!is_valid_cluster_name("1cluster"));
        assert!(!is_valid_cluster_name("cluster-"));
        assert!(!is_valid_cluster_name("ab"));
    }

    #[test]
    fn invalid_cluster_name_rejected() {
        let yaml = VALID.replace("node-cluster-1", "1cluster");
        let err = ScalerConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(err.issues()[0].contains("1cluster"));
    }

    #[test]
    fn collects_all_issues() {
        let yaml = VALID
            .replace("os_admin_password: admin", "os_admin_password: \"\"")
            .replace("polling_interval_in_secs: 30", "polling_interval_in_secs: 0")
            .replace("scale_up_by_1", "scaleup1");
        let err = ScalerConfig::from_yaml_str(&yaml).unwrap_err();
        assert_eq!(err.issues().len(), 3);
    }

    #[test]
    fn missing_credentials_is_parse_error() {
        let yaml = VALID.replace("    secret_key: secret\n", "");
        let err = ScalerConfig::from_yaml_str(&yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, VALID).unwrap();

        let config = ScalerConfig::load(&path).unwrap();
        assert_eq!(config.task_details[0].task_name, "scale_up_by_1");

        let missing = ScalerConfig::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));
    }
}
