//! Test connection shared by the pool unit tests

use super::ConnectionPool;
use crate::connection::{Connection, ConnectionSettings, ConnectionTimeouts, Priority};
use crate::error::ConnectionError;
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Connection that never touches the network
///
/// Hosts starting with `down` refuse to connect; hosts starting with `panic`
/// cannot even be constructed.
#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
    pub host: String,
    pub connected: bool,
}

#[async_trait]
impl Connection for MockConnection {
    fn from_settings(settings: &ConnectionSettings) -> Self {
        if settings.host.starts_with("panic") {
            panic!("cannot construct connection to {}", settings.host);
        }
        MockConnection {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            host: settings.host.clone(),
            connected: false,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn force_connected(
        &mut self,
        _timeouts: &ConnectionTimeouts,
    ) -> Result<(), ConnectionError> {
        if self.host.starts_with("down") {
            return Err(ConnectionError::Connect {
                address: self.host.clone(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        self.connected = true;
        Ok(())
    }
}

pub fn mock_pool(host: &str, port: u16, capacity: usize) -> ConnectionPool<MockConnection> {
    ConnectionPool::new(
        capacity,
        ConnectionSettings::new(host, port),
        Priority::default(),
    )
}
