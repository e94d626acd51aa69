//! Connection pool configuration
//!
//! Capacity, waiting behaviour and pool variant shared by every target.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum connections per pool
fn default_max_connections() -> usize {
    16
}

/// Default connect timeout in milliseconds
fn default_connect_ms() -> u64 {
    10_000
}

/// Default send/receive timeout in milliseconds
fn default_io_ms() -> u64 {
    300_000
}

/// How targets are grouped into a pool handle
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum PoolVariant {
    /// One target, one bounded pool
    #[default]
    #[serde(rename = "plain")]
    Plain,
    /// Several replicas tried in priority order with failover
    #[serde(rename = "replica_aware")]
    ReplicaAware,
}

/// Connection pool configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    /// Maximum number of live connections per target
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum time to wait for a free connection in milliseconds (0 waits forever)
    #[serde(default)]
    pub max_wait_ms: u64,

    /// Pool variant
    #[serde(default)]
    pub variant: PoolVariant,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections: default_max_connections(),
            max_wait_ms: 0,
            variant: PoolVariant::default(),
        }
    }
}

impl PoolConfig {
    /// Acquire deadline, `None` meaning wait forever
    pub fn max_wait(&self) -> Option<Duration> {
        match self.max_wait_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Connection timeouts in milliseconds
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TimeoutsConfig {
    /// Connect (and TLS handshake) timeout
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,

    /// Send timeout
    #[serde(default = "default_io_ms")]
    pub send_ms: u64,

    /// Receive timeout
    #[serde(default = "default_io_ms")]
    pub receive_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        TimeoutsConfig {
            connect_ms: default_connect_ms(),
            send_ms: default_io_ms(),
            receive_ms: default_io_ms(),
        }
    }
}
