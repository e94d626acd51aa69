//! Connection pool registry
//!
//! Shares one pool per distinct configuration among all callers that hold it,
//! without keeping pools alive on its own.

use super::ConnectionPool;
use crate::config::{PoolConfig, TargetConfig};
use crate::connection::{Connection, ConnectionSettings, Priority};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Everything that distinguishes one pool from another
///
/// Equality and hashing cover every field: capacity, all connection
/// settings, and priority.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    /// Pool capacity
    pub max_connections: usize,
    /// Connection settings
    pub settings: ConnectionSettings,
    /// Replica priority
    pub priority: Priority,
}

impl PoolKey {
    /// Build a key from its parts
    pub fn new(max_connections: usize, settings: ConnectionSettings, priority: Priority) -> Self {
        PoolKey {
            max_connections,
            settings,
            priority,
        }
    }

    /// Key for `target` under the shared pool configuration
    pub fn from_target(pool: &PoolConfig, target: &TargetConfig) -> Self {
        PoolKey::new(pool.max_connections, target.to_settings(), target.priority)
    }
}

/// Registry of pools keyed by their full configuration
///
/// Build one per process and pass it to whoever needs pools. The registry
/// only observes pools through weak references: a pool lives as long as
/// some caller holds it, and a later request for the same key after that
/// builds a fresh one.
pub struct PoolRegistry<C: Connection> {
    pools: Mutex<HashMap<PoolKey, Weak<ConnectionPool<C>>>>,
}

impl<C: Connection> Default for PoolRegistry<C> {
    fn default() -> Self {
        PoolRegistry {
            pools: Mutex::new(HashMap::new()),
        }
    }
}

impl<C: Connection> std::fmt::Debug for PoolRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("entries", &self.len())
            .field("live_pools", &self.live_pools())
            .finish()
    }
}

impl<C: Connection> PoolRegistry<C> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live pool for `key`, or build and register a new one
    pub fn get_or_create(&self, key: PoolKey) -> Arc<ConnectionPool<C>> {
        let mut pools = self.pools.lock();

        if let Some(pool) = pools.get(&key).and_then(Weak::upgrade) {
            debug!("Reusing connection pool for {}", pool.address());
            return pool;
        }

        let pool = Arc::new(ConnectionPool::new(
            key.max_connections,
            key.settings.clone(),
            key.priority,
        ));
        info!(
            "Created connection pool for {} (max_connections={}, priority={})",
            pool.address(),
            key.max_connections,
            key.priority
        );
        pools.insert(key, Arc::downgrade(&pool));
        pool
    }

    /// Shorthand for [`PoolRegistry::get_or_create`] from the key's parts
    pub fn get(
        &self,
        max_connections: usize,
        settings: ConnectionSettings,
        priority: Priority,
    ) -> Arc<ConnectionPool<C>> {
        self.get_or_create(PoolKey::new(max_connections, settings, priority))
    }

    /// Number of registered pools still alive
    pub fn live_pools(&self) -> usize {
        self.pools
            .lock()
            .values()
            .filter(|pool| pool.strong_count() > 0)
            .count()
    }

    /// Number of entries, including ones whose pool is gone
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    /// Whether nothing was ever registered
    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }
}
