//! Bounded connection pool implementation
//!
//! Hands out connections to one target under a hard capacity bound.

use super::entry::PoolEntry;
use super::pooled::PooledConnection;
use super::stats::PoolStats;
use super::PoolStatus;
use crate::connection::{Connection, ConnectionSettings, ConnectionTimeouts, Priority};
use crate::error::PoolError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Mutable pool state, guarded by the pool lock
struct PoolState<C> {
    /// Idle connections, oldest return first
    idle: VecDeque<PooledConnection<C>>,
    /// Idle plus borrowed connections
    live: usize,
}

/// State shared between a pool and the entries it handed out
pub(crate) struct PoolShared<C> {
    /// `host:port` of the target, for logs and errors
    address: String,
    /// Maximum number of live connections
    capacity: usize,
    /// Idle set and live count
    state: Mutex<PoolState<C>>,
    /// Signalled whenever a slot or an idle connection frees up
    available: Notify,
    /// Lifetime counters
    stats: PoolStats,
}

impl<C> PoolShared<C> {
    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    /// Take back a borrowed connection
    pub(crate) fn release(&self, mut pooled: PooledConnection<C>, healthy: bool) {
        if healthy {
            pooled.touch();
            let idle = {
                let mut state = self.state.lock();
                state.idle.push_back(pooled);
                state.idle.len()
            };
            self.stats.record_returned();
            debug!("Connection returned to pool {}, idle: {}", self.address, idle);
        } else {
            let live = {
                let mut state = self.state.lock();
                state.live -= 1;
                state.live
            };
            self.stats.record_discarded();
            debug!(
                "Discarded unhealthy connection to {}, live: {}/{}",
                self.address, live, self.capacity
            );
            drop(pooled);
        }

        self.available.notify_one();
    }

    /// Give up the slot of a connection that left the pool for good
    pub(crate) fn forget(&self) {
        {
            let mut state = self.state.lock();
            state.live -= 1;
        }
        self.stats.record_discarded();
        debug!("Connection detached from pool {}", self.address);
        self.available.notify_one();
    }
}

/// Slot counted in `live` whose connection is still being constructed
///
/// Gives the slot back if construction unwinds.
struct SlotReservation<'a, C> {
    shared: &'a PoolShared<C>,
    armed: bool,
}

impl<'a, C> SlotReservation<'a, C> {
    fn new(shared: &'a PoolShared<C>) -> Self {
        SlotReservation {
            shared,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl<C> Drop for SlotReservation<'_, C> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.state.lock().live -= 1;
            warn!("Connection construction for {} failed, slot released", self.shared.address);
            self.shared.available.notify_one();
        }
    }
}

/// A common connection pool, without fault tolerance
///
/// Idle connections are served oldest-returned first. New connections are
/// constructed unconnected; callers either verify through
/// [`ConnectionPool::acquire_verified`] or check for themselves.
pub struct ConnectionPool<C: Connection> {
    host: String,
    port: u16,
    address: String,
    priority: Priority,
    settings: ConnectionSettings,
    shared: Arc<PoolShared<C>>,
}

impl<C: Connection> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.address)
            .field("priority", &self.priority)
            .field("status", &self.status())
            .finish()
    }
}

impl<C: Connection> ConnectionPool<C> {
    /// Create an empty pool holding at most `max_connections` connections
    pub fn new(max_connections: usize, settings: ConnectionSettings, priority: Priority) -> Self {
        let address = settings.address();
        ConnectionPool {
            host: settings.host.clone(),
            port: settings.port,
            address: address.clone(),
            priority,
            settings,
            shared: Arc::new(PoolShared {
                address,
                capacity: max_connections,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    live: 0,
                }),
                available: Notify::new(),
                stats: PoolStats::new(),
            }),
        }
    }

    /// Target host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Target port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` composite
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Priority passed through to replica selection
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Maximum number of live connections
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Settings new connections are constructed from
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Human readable pool name
    pub fn description(&self) -> String {
        self.address.clone()
    }

    /// Consistent view of idle and borrowed counts
    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            capacity: self.shared.capacity,
            idle: state.idle.len(),
            borrowed: state.live - state.idle.len(),
        }
    }

    /// Get pool statistics
    pub fn stats(&self) -> &PoolStats {
        &self.shared.stats
    }

    /// Take an idle connection, or reserve a slot and build a new one
    fn try_acquire(&self) -> Option<PoolEntry<C>> {
        let mut state = self.shared.state.lock();

        if let Some(mut pooled) = state.idle.pop_front() {
            let idle = state.idle.len();
            drop(state);

            debug!(
                "Reusing connection to {} (idle for {:?}, idle left: {})",
                self.address,
                pooled.idle_time(),
                idle
            );
            pooled.checkout();
            self.shared.stats.record_acquired(true);
            return Some(PoolEntry::new(pooled, self.shared.clone()));
        }

        if state.live < self.shared.capacity {
            state.live += 1;
            let live = state.live;
            drop(state);

            let reservation = SlotReservation::new(&self.shared);
            let conn = C::from_settings(&self.settings);
            reservation.complete();

            let mut pooled = PooledConnection::new(conn);
            pooled.checkout();
            self.shared.stats.record_created();
            self.shared.stats.record_acquired(false);
            debug!(
                "Created new connection to {}, live: {}/{}",
                self.address, live, self.shared.capacity
            );
            return Some(PoolEntry::new(pooled, self.shared.clone()));
        }

        None
    }

    /// Acquire a connection, waiting at most `max_wait` (`None` waits forever)
    ///
    /// The returned connection may not be connected yet, or may have gone
    /// stale while idle; the caller is responsible for checking it.
    pub async fn acquire(&self, max_wait: Option<Duration>) -> Result<PoolEntry<C>, PoolError> {
        let deadline = max_wait.and_then(|wait| Instant::now().checked_add(wait));

        loop {
            // Register interest before looking, so a release in between is not lost
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.try_acquire() {
                return Ok(entry);
            }

            match deadline {
                None => notified.await,
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        self.shared.stats.record_timeout();
                        debug!("Timeout waiting for connection to {}", self.address);
                        return Err(PoolError::Timeout {
                            address: self.address.clone(),
                            waited: max_wait.unwrap_or_default(),
                        });
                    }
                }
            }
        }
    }

    /// Acquire a connection and make sure it is established
    ///
    /// A connection that cannot be established is reported, not retried.
    pub async fn acquire_verified(
        &self,
        max_wait: Option<Duration>,
        timeouts: &ConnectionTimeouts,
    ) -> Result<PoolEntry<C>, PoolError> {
        let mut entry = self.acquire(max_wait).await?;

        if let Err(e) = entry.force_connected(timeouts).await {
            self.shared.stats.record_verify_failure();
            warn!("Failed to establish connection to {}: {}", self.address, e);
            return Err(PoolError::Connection {
                address: self.address.clone(),
                source: e,
            });
        }

        Ok(entry)
    }
}
