//! Replica-aware pool
//!
//! Tries a set of replica pools in order of past errors and priority,
//! falling over to the next replica when one cannot serve a connection.

use super::{ConnectionPool, ConnectionSource, PoolEntry};
use crate::connection::{Connection, ConnectionTimeouts, Priority};
use crate::error::PoolError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Replica<C: Connection> {
    pool: Arc<ConnectionPool<C>>,
    errors: AtomicUsize,
}

/// Pool over several replicas of the same data
pub struct FailoverPool<C: Connection> {
    replicas: Vec<Replica<C>>,
    address: String,
}

impl<C: Connection> std::fmt::Debug for FailoverPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverPool")
            .field("replicas", &self.address)
            .field("error_counts", &self.error_counts())
            .finish()
    }
}

impl<C: Connection> FailoverPool<C> {
    /// Wrap replica pools; at least one is required
    pub fn new(pools: Vec<Arc<ConnectionPool<C>>>) -> Result<Self, PoolError> {
        if pools.is_empty() {
            return Err(PoolError::Config(
                "replica-aware pool needs at least one replica".to_string(),
            ));
        }

        let address = pools
            .iter()
            .map(|pool| pool.address())
            .collect::<Vec<_>>()
            .join(",");
        let replicas = pools
            .into_iter()
            .map(|pool| Replica {
                pool,
                errors: AtomicUsize::new(0),
            })
            .collect();

        Ok(FailoverPool { replicas, address })
    }

    /// Replica pools in configuration order
    pub fn replicas(&self) -> impl Iterator<Item = &Arc<ConnectionPool<C>>> {
        self.replicas.iter().map(|replica| &replica.pool)
    }

    /// Failures recorded per replica address
    pub fn error_counts(&self) -> Vec<(String, usize)> {
        self.replicas
            .iter()
            .map(|r| (r.pool.address().to_string(), r.errors.load(Ordering::Relaxed)))
            .collect()
    }

    /// Forget recorded failures
    pub fn reset_errors(&self) {
        for replica in &self.replicas {
            replica.errors.store(0, Ordering::Relaxed);
        }
    }

    /// Replica indices, fewest errors first, then lowest priority value
    fn try_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.replicas.len()).collect();
        order.sort_by_key(|&i| {
            let replica = &self.replicas[i];
            (
                replica.errors.load(Ordering::Relaxed),
                replica.pool.priority(),
                i,
            )
        });
        order
    }
}

#[async_trait]
impl<C: Connection> ConnectionSource<C> for FailoverPool<C> {
    async fn get_with(
        &self,
        timeouts: &ConnectionTimeouts,
        max_wait: Option<Duration>,
        force_connected: bool,
    ) -> Result<PoolEntry<C>, PoolError> {
        let deadline = max_wait.and_then(|wait| Instant::now().checked_add(wait));
        let mut failures = Vec::new();
        let mut only_timeouts = true;

        for index in self.try_order() {
            let replica = &self.replicas[index];
            // Replicas share one deadline; once it passed, each gets a single non-blocking try
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match replica.pool.get_with(timeouts, remaining, force_connected).await {
                Ok(entry) => {
                    debug!("Serving connection from replica {}", replica.pool.address());
                    return Ok(entry);
                }
                Err(e) => {
                    let errors = replica.errors.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        "Replica {} failed ({} errors so far): {}",
                        replica.pool.address(),
                        errors,
                        e
                    );
                    only_timeouts &= e.is_timeout();
                    failures.push(format!("{}: {}", replica.pool.address(), e));
                }
            }
        }

        if only_timeouts {
            debug!("Timeout waiting for a connection to any of {}", self.address);
            return Err(PoolError::Timeout {
                address: self.address.clone(),
                waited: max_wait.unwrap_or_default(),
            });
        }

        Err(PoolError::AllReplicasFailed {
            count: failures.len(),
            details: failures.join("; "),
        })
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn priority(&self) -> Priority {
        self.replicas
            .iter()
            .map(|replica| replica.pool.priority())
            .min()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSettings;
    use crate::pool::testing::MockConnection;

    fn replica(host: &str, priority: i64) -> Arc<ConnectionPool<MockConnection>> {
        Arc::new(ConnectionPool::new(
            2,
            ConnectionSettings::new(host, 9000),
            Priority(priority),
        ))
    }

    #[test]
    fn test_failover_requires_replicas() {
        let result = FailoverPool::<MockConnection>::new(Vec::new());
        assert!(matches!(result, Err(PoolError::Config(_))));
    }

    #[test]
    fn test_failover_metadata() {
        let pool = FailoverPool::new(vec![replica("db1", 2), replica("db2", 1)]).unwrap();
        assert_eq!(pool.address(), "db1:9000,db2:9000");
        assert_eq!(pool.priority(), Priority(1));
        assert_eq!(pool.replicas().count(), 2);
    }

    #[tokio::test]
    async fn test_failover_prefers_lower_priority_value() {
        let pool = FailoverPool::new(vec![replica("db1", 2), replica("db2", 1)]).unwrap();
        let entry = pool.get(&ConnectionTimeouts::default()).await.unwrap();
        assert_eq!(entry.pool_address(), "db2:9000");
    }

    #[tokio::test]
    async fn test_failover_skips_failed_replica() {
        let pool = FailoverPool::new(vec![replica("down1", 0), replica("db2", 1)]).unwrap();

        let entry = pool.get(&ConnectionTimeouts::default()).await.unwrap();
        assert_eq!(entry.pool_address(), "db2:9000");
        assert!(entry.is_connected());
        drop(entry);

        assert_eq!(
            pool.error_counts(),
            vec![("down1:9000".to_string(), 1), ("db2:9000".to_string(), 0)]
        );

        // The failing replica now sorts last despite its priority
        let entry = pool
            .get_with(&ConnectionTimeouts::default(), None, false)
            .await
            .unwrap();
        assert_eq!(entry.pool_address(), "db2:9000");

        pool.reset_errors();
        assert!(pool.error_counts().iter().all(|(_, n)| *n == 0));
    }

    #[tokio::test]
    async fn test_failover_all_replicas_failed() {
        let pool = FailoverPool::new(vec![replica("down1", 1), replica("down2", 1)]).unwrap();

        let err = pool.get(&ConnectionTimeouts::default()).await.unwrap_err();
        match err {
            PoolError::AllReplicasFailed { count, details } => {
                assert_eq!(count, 2);
                assert!(details.contains("down1:9000"));
                assert!(details.contains("down2:9000"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_shares_one_deadline() {
        let replicas: Vec<_> = ["db1", "db2", "db3"]
            .into_iter()
            .map(|host| {
                Arc::new(ConnectionPool::<MockConnection>::new(
                    1,
                    ConnectionSettings::new(host, 9000),
                    Priority(1),
                ))
            })
            .collect();
        let pool = FailoverPool::new(replicas.clone()).unwrap();

        let mut held = Vec::new();
        for replica in &replicas {
            held.push(replica.acquire(None).await.unwrap());
        }

        let started = Instant::now();
        let err = pool
            .get_with(
                &ConnectionTimeouts::default(),
                Some(Duration::from_millis(100)),
                false,
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("db1:9000,db2:9000,db3:9000"));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_mixed_failures_are_not_a_timeout() {
        let busy = replica("db1", 0);
        let pool = FailoverPool::new(vec![busy.clone(), replica("down2", 1)]).unwrap();
        let _held = busy.acquire(None).await.unwrap();

        let err = pool
            .get_with(
                &ConnectionTimeouts::default(),
                Some(Duration::from_millis(100)),
                true,
            )
            .await
            .unwrap_err();

        assert!(!err.is_timeout());
        assert!(matches!(err, PoolError::AllReplicasFailed { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_failover_on_exhausted_replica() {
        let busy = Arc::new(ConnectionPool::new(
            1,
            ConnectionSettings::new("db1", 9000),
            Priority(0),
        ));
        let pool = FailoverPool::new(vec![busy.clone(), replica("db2", 1)]).unwrap();

        let _held = busy.acquire(None).await.unwrap();
        let entry = pool
            .get_with(&ConnectionTimeouts::default(), Some(Duration::ZERO), false)
            .await
            .unwrap();
        assert_eq!(entry.pool_address(), "db2:9000");
    }
}
