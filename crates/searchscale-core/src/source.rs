//! Where the control loops get a fresh configuration snapshot each tick.

use std::path::PathBuf;

use crate::config::ScalerConfig;
use crate::error::ConfigError;

/// Yields a validated configuration snapshot.
///
/// Called at startup and again on every control-loop tick.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<ScalerConfig, ConfigError>;
}

/// Re-reads a YAML file from disk on every call.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<ScalerConfig, ConfigError> {
        ScalerConfig::load(&self.path)
    }
}

/// A fixed snapshot, re-validated on each load.
impl ConfigSource for ScalerConfig {
    fn load(&self) -> Result<ScalerConfig, ConfigError> {
        self.validate()?;
        Ok(self.clone())
    }
}
