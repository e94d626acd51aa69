//! Test utilities and mocks for Connpool
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use connpool::connection::{Connection, ConnectionSettings, ConnectionTimeouts, Priority};
use connpool::error::ConnectionError;
use connpool::pool::ConnectionPool;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

/// Connection that never touches the network
///
/// Hosts starting with `down` refuse to connect.
#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
    pub host: String,
    pub connected: bool,
    pub connects: usize,
}

#[async_trait]
impl Connection for MockConnection {
    fn from_settings(settings: &ConnectionSettings) -> Self {
        MockConnection {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            host: settings.host.clone(),
            connected: false,
            connects: 0,
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
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        if !self.connected {
            self.connects += 1;
            self.connected = true;
        }
        Ok(())
    }
}

/// Create a mock pool with default priority
pub fn mock_pool(host: &str, port: u16, capacity: usize) -> Arc<ConnectionPool<MockConnection>> {
    Arc::new(ConnectionPool::new(
        capacity,
        ConnectionSettings::new(host, port),
        Priority::default(),
    ))
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Accept connections forever, counting them, and echo whatever arrives
pub fn spawn_echo_server(listener: TcpListener) -> Arc<AtomicUsize> {
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    accepted
}

/// Accept connections forever, counting them, and close each one right away
pub fn spawn_closing_server(listener: TcpListener) -> Arc<AtomicUsize> {
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });

    accepted
}
