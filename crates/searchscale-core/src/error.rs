//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ConfigError {
    /// Validation problems, if this is a validation error.
    pub fn issues(&self) -> &[String] {
        match self {
            ConfigError::Invalid(issues) => issues,
            _ => &[],
        }
    }
}
