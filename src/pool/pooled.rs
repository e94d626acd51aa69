//! Pooled connection structure
//!
//! Represents a single connection owned by a pool, with usage metadata.

use std::time::{Duration, Instant};

/// A pooled connection with metadata
#[derive(Debug)]
pub struct PooledConnection<C> {
    /// The underlying connection
    pub(crate) conn: C,
    /// When the connection was created
    pub(crate) created_at: Instant,
    /// When the connection was last handed out or returned
    pub(crate) last_used: Instant,
    /// How many times the connection has been handed out
    pub(crate) borrows: u64,
}

impl<C> PooledConnection<C> {
    /// Wrap a freshly constructed connection
    pub fn new(conn: C) -> Self {
        let now = Instant::now();
        PooledConnection {
            conn,
            created_at: now,
            last_used: now,
            borrows: 0,
        }
    }

    /// Get the age of the connection
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Get the time since last use
    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Number of times the connection has been handed out
    pub fn borrows(&self) -> u64 {
        self.borrows
    }

    /// Mark the connection as used
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    /// Record a hand-out
    pub(crate) fn checkout(&mut self) {
        self.borrows += 1;
        self.touch();
    }

    /// Get the underlying connection
    pub fn into_inner(self) -> C {
        self.conn
    }
}
