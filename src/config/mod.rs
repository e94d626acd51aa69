//! Configuration module for Connpool
//!
//! This module provides configuration types and parsing for pools and targets.

mod pool;
mod target;
mod transport;

pub use pool::{PoolConfig, PoolVariant, TimeoutsConfig};
pub use target::TargetConfig;
pub use transport::TcpConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Pool settings shared by all targets
    #[serde(default)]
    pub pool: PoolConfig,

    /// Connection timeouts
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Remote servers
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

impl Config {
    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate()?;

        if self.targets.is_empty() {
            return Err("at least one target is required".to_string());
        }
        for target in &self.targets {
            target.validate()?;
        }

        if self.pool.variant == PoolVariant::Plain && self.targets.len() > 1 {
            return Err(format!(
                "plain pool takes exactly one target, got {}; use variant = \"replica_aware\"",
                self.targets.len()
            ));
        }

        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).with_context(|| "Failed to parse configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}
