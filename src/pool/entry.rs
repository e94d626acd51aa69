//! RAII guard for pooled connections
//!
//! Provides automatic return of connections to their pool when dropped.

use super::bounded::PoolShared;
use super::pooled::PooledConnection;
use crate::connection::{Connection, ConnectionTimeouts};
use crate::error::ConnectionError;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

/// Exclusive lease on one pooled connection
///
/// Dropping the entry hands the connection back to its pool exactly once:
/// into the idle set if it is healthy, or out of the pool entirely if it was
/// marked unhealthy. Entries are not `Clone`; moving one to another task
/// moves the lease with it.
pub struct PoolEntry<C: Connection> {
    /// The connection (Option to allow detaching)
    pooled: Option<PooledConnection<C>>,
    /// Pool the connection goes back to
    pool: Arc<PoolShared<C>>,
    /// Whether the connection may be reused
    healthy: bool,
}

impl<C: Connection> PoolEntry<C> {
    pub(crate) fn new(pooled: PooledConnection<C>, pool: Arc<PoolShared<C>>) -> Self {
        PoolEntry {
            pooled: Some(pooled),
            pool,
            healthy: true,
        }
    }

    /// Report a protocol-level failure; the connection is discarded on drop
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    /// Set whether the connection goes back to the idle set on drop
    pub fn set_healthy(&mut self, healthy: bool) {
        self.healthy = healthy;
    }

    /// Whether the connection will be reused after drop
    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Address of the pool this entry belongs to
    pub fn pool_address(&self) -> &str {
        self.pool.address()
    }

    /// Time since the connection was constructed
    pub fn age(&self) -> Duration {
        self.pooled.as_ref().map_or(Duration::ZERO, |p| p.age())
    }

    /// How many times the connection has been handed out, this time included
    pub fn borrows(&self) -> u64 {
        self.pooled.as_ref().map_or(0, |p| p.borrows())
    }

    /// Make sure the connection is established
    pub async fn force_connected(
        &mut self,
        timeouts: &ConnectionTimeouts,
    ) -> Result<(), ConnectionError> {
        Connection::force_connected(&mut **self, timeouts).await
    }

    /// Take the connection out of the pool for good, freeing its slot
    pub fn detach(mut self) -> C {
        let pooled = self.pooled.take().expect("connection already released");
        self.pool.forget();
        pooled.into_inner()
    }
}

impl<C: Connection> Deref for PoolEntry<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self
            .pooled
            .as_ref()
            .expect("connection already released")
            .conn
    }
}

impl<C: Connection> DerefMut for PoolEntry<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self
            .pooled
            .as_mut()
            .expect("connection already released")
            .conn
    }
}

impl<C: Connection> std::fmt::Debug for PoolEntry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolEntry")
            .field("pool", &self.pool.address())
            .field("healthy", &self.healthy)
            .field("borrows", &self.borrows())
            .finish()
    }
}

impl<C: Connection> Drop for PoolEntry<C> {
    fn drop(&mut self) {
        if let Some(pooled) = self.pooled.take() {
            self.pool.release(pooled, self.healthy);
        }
    }
}
