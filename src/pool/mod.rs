//! Connection pool module for Connpool
//!
//! This module provides bounded per-target pools, the registry that shares
//! them between callers, and the replica-aware variant built on top.

mod bounded;
mod entry;
mod failover;
mod pooled;
mod registry;
mod stats;
#[cfg(test)]
pub(crate) mod testing;

pub use bounded::ConnectionPool;
pub use entry::PoolEntry;
pub use failover::FailoverPool;
pub use pooled::PooledConnection;
pub use registry::{PoolKey, PoolRegistry};
pub use stats::{PoolStats, PoolStatsSnapshot};

use crate::config::{Config, PoolVariant};
use crate::connection::{Connection, ConnectionTimeouts, Priority};
use crate::error::PoolError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time occupancy of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Maximum number of live connections
    pub capacity: usize,
    /// Connections waiting in the idle set
    pub idle: usize,
    /// Connections currently lent out
    pub borrowed: usize,
}

/// Anything that can lend out connections
#[async_trait]
pub trait ConnectionSource<C: Connection>: Send + Sync {
    /// Wait as long as needed and return an established connection
    async fn get(&self, timeouts: &ConnectionTimeouts) -> Result<PoolEntry<C>, PoolError> {
        self.get_with(timeouts, None, true).await
    }

    /// Acquire with a deadline; without `force_connected` the caller must
    /// check the connection itself
    async fn get_with(
        &self,
        timeouts: &ConnectionTimeouts,
        max_wait: Option<Duration>,
        force_connected: bool,
    ) -> Result<PoolEntry<C>, PoolError>;

    /// Address for logs and selection
    fn address(&self) -> &str;

    /// Priority for selection
    fn priority(&self) -> Priority;
}

#[async_trait]
impl<C: Connection> ConnectionSource<C> for ConnectionPool<C> {
    async fn get_with(
        &self,
        timeouts: &ConnectionTimeouts,
        max_wait: Option<Duration>,
        force_connected: bool,
    ) -> Result<PoolEntry<C>, PoolError> {
        if force_connected {
            self.acquire_verified(max_wait, timeouts).await
        } else {
            self.acquire(max_wait).await
        }
    }

    fn address(&self) -> &str {
        ConnectionPool::address(self)
    }

    fn priority(&self) -> Priority {
        ConnectionPool::priority(self)
    }
}

/// A pool of either variant, chosen by configuration
pub enum PoolHandle<C: Connection> {
    /// Single target
    Plain(Arc<ConnectionPool<C>>),
    /// Several replicas with failover
    ReplicaAware(Arc<FailoverPool<C>>),
}

impl<C: Connection> Clone for PoolHandle<C> {
    fn clone(&self) -> Self {
        match self {
            PoolHandle::Plain(pool) => PoolHandle::Plain(pool.clone()),
            PoolHandle::ReplicaAware(pool) => PoolHandle::ReplicaAware(pool.clone()),
        }
    }
}

impl<C: Connection> std::fmt::Debug for PoolHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolHandle::Plain(pool) => f.debug_tuple("Plain").field(pool).finish(),
            PoolHandle::ReplicaAware(pool) => f.debug_tuple("ReplicaAware").field(pool).finish(),
        }
    }
}

impl<C: Connection> PoolHandle<C> {
    /// Build the configured pool variant, sharing pools through `registry`
    pub fn from_config(config: &Config, registry: &PoolRegistry<C>) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::Config)?;

        let mut pools: Vec<_> = config
            .targets
            .iter()
            .map(|target| registry.get_or_create(PoolKey::from_target(&config.pool, target)))
            .collect();

        match config.pool.variant {
            PoolVariant::Plain => {
                let pool = pools
                    .pop()
                    .ok_or_else(|| PoolError::Config("no target configured".to_string()))?;
                Ok(PoolHandle::Plain(pool))
            }
            PoolVariant::ReplicaAware => {
                Ok(PoolHandle::ReplicaAware(Arc::new(FailoverPool::new(pools)?)))
            }
        }
    }

    /// Every bounded pool behind this handle
    pub fn pools(&self) -> Vec<Arc<ConnectionPool<C>>> {
        match self {
            PoolHandle::Plain(pool) => vec![pool.clone()],
            PoolHandle::ReplicaAware(pool) => pool.replicas().cloned().collect(),
        }
    }
}

#[async_trait]
impl<C: Connection> ConnectionSource<C> for PoolHandle<C> {
    async fn get_with(
        &self,
        timeouts: &ConnectionTimeouts,
        max_wait: Option<Duration>,
        force_connected: bool,
    ) -> Result<PoolEntry<C>, PoolError> {
        match self {
            PoolHandle::Plain(pool) => pool.get_with(timeouts, max_wait, force_connected).await,
            PoolHandle::ReplicaAware(pool) => {
                pool.get_with(timeouts, max_wait, force_connected).await
            }
        }
    }

    fn address(&self) -> &str {
        match self {
            PoolHandle::Plain(pool) => pool.address(),
            PoolHandle::ReplicaAware(pool) => pool.address(),
        }
    }

    fn priority(&self) -> Priority {
        match self {
            PoolHandle::Plain(pool) => pool.priority(),
            PoolHandle::ReplicaAware(pool) => pool.priority(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockConnection;
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_handle_plain_from_config() {
        let config = parse_config("[[targets]]\nhost = \"db1\"\nport = 9000\n").unwrap();
        let registry: PoolRegistry<MockConnection> = PoolRegistry::new();

        let handle = PoolHandle::from_config(&config, &registry).unwrap();
        assert!(matches!(handle, PoolHandle::Plain(_)));
        assert_eq!(handle.address(), "db1:9000");

        // Building again while the first handle lives shares the pool
        let again = PoolHandle::from_config(&config, &registry).unwrap();
        assert!(Arc::ptr_eq(&handle.pools()[0], &again.pools()[0]));
        assert_eq!(registry.live_pools(), 1);
    }

    #[test]
    fn test_handle_replica_aware_from_config() {
        let config = parse_config(
            r#"
[pool]
variant = "replica_aware"
max_connections = 2

[[targets]]
host = "db1"
port = 9000
priority = 5

[[targets]]
host = "db2"
port = 9000
priority = 3
"#,
        )
        .unwrap();
        let registry: PoolRegistry<MockConnection> = PoolRegistry::new();

        let handle = PoolHandle::from_config(&config, &registry).unwrap();
        assert!(matches!(handle, PoolHandle::ReplicaAware(_)));
        assert_eq!(handle.priority(), Priority(3));
        assert_eq!(handle.pools().len(), 2);
        assert!(handle.pools().iter().all(|p| p.capacity() == 2));
    }

    #[test]
    fn test_handle_rejects_invalid_config() {
        let config = Config::default();
        let registry: PoolRegistry<MockConnection> = PoolRegistry::new();

        let err = PoolHandle::from_config(&config, &registry).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
    }

    #[tokio::test]
    async fn test_handle_get_delegates() {
        let config = parse_config("[[targets]]\nhost = \"db1\"\nport = 9000\n").unwrap();
        let registry: PoolRegistry<MockConnection> = PoolRegistry::new();
        let handle = PoolHandle::from_config(&config, &registry).unwrap();

        let entry = handle.get(&ConnectionTimeouts::default()).await.unwrap();
        assert!(entry.is_connected());
        assert_eq!(handle.pools()[0].status().borrowed, 1);
    }

    #[tokio::test]
    async fn test_plain_get_with_without_verification() {
        let config = parse_config("[[targets]]\nhost = \"down1\"\nport = 9000\n").unwrap();
        let registry: PoolRegistry<MockConnection> = PoolRegistry::new();
        let handle = PoolHandle::from_config(&config, &registry).unwrap();

        let entry = handle
            .get_with(&ConnectionTimeouts::default(), None, false)
            .await
            .unwrap();
        assert!(!entry.is_connected());
        drop(entry);

        let err = handle
            .get_with(&ConnectionTimeouts::default(), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::Connection { .. }));
    }
}
