//! searchscale-core: configuration and task types shared by the scaler.
//!
//! The configuration file is YAML and is re-read on every control-loop
//! tick, so everything here is cheap to load and validate repeatedly.
//!
//! # Layout
//!
//! ```text
//! user_config:      polling interval, monitoring mode, failure policy
//! cluster_details:  cluster identity + store/cloud credentials
//! task_details:     ordered scale_(up|down)_by_<n> rules
//! ```

pub mod config;
pub mod error;
pub mod source;
pub mod task;

pub use config::{
    CloudCredentials, ClusterDetails, ClusterStatic, FailurePolicy, MonitorMode, OsCredentials,
    ScalerConfig, UserConfig, is_valid_cluster_name,
};
pub use error::ConfigError;
pub use source::{ConfigSource, FileConfigSource};
pub use task::{Rule, RuleOperator, ScaleAction, ScaleDirection, Stat, Task, is_valid_task_name};
