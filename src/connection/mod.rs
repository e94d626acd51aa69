//! Connection module for Connpool
//!
//! This module defines the capability surface pools need from a connection
//! and provides a TCP implementation of it.

mod settings;
mod tcp;
#[cfg(feature = "rustls-tls")]
mod tls;

pub use settings::{ChunkedMode, Compression, ConnectionSettings, Priority, Secure};
pub use tcp::{ConnStream, TcpConnection};

use crate::config::{TcpConfig, TimeoutsConfig};
use crate::error::ConnectionError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Timeouts applied while talking to a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTimeouts {
    /// Time allowed to establish the TCP (and TLS) connection
    pub connect: Duration,
    /// Time allowed for a single send
    pub send: Duration,
    /// Time allowed for a single receive
    pub receive: Duration,
}

impl Default for ConnectionTimeouts {
    fn default() -> Self {
        ConnectionTimeouts::from_config(&TimeoutsConfig::default())
    }
}

impl ConnectionTimeouts {
    /// Build timeouts from their configuration
    pub fn from_config(config: &TimeoutsConfig) -> Self {
        ConnectionTimeouts {
            connect: Duration::from_millis(config.connect_ms),
            send: Duration::from_millis(config.send_ms),
            receive: Duration::from_millis(config.receive_ms),
        }
    }

    /// Override the connect timeout
    pub fn with_connect(mut self, connect: Duration) -> Self {
        self.connect = connect;
        self
    }
}

/// A connection that can live in a pool
///
/// Pools construct connections lazily and never interpret their protocol
/// state. Construction must not touch the network; connecting happens on
/// first use or through [`Connection::force_connected`].
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Construct an unconnected connection for the given settings
    fn from_settings(settings: &ConnectionSettings) -> Self
    where
        Self: Sized;

    /// Whether the connection currently holds an established session
    fn is_connected(&self) -> bool;

    /// Make sure the connection is established, reconnecting if it went bad
    async fn force_connected(&mut self, timeouts: &ConnectionTimeouts)
        -> Result<(), ConnectionError>;
}

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts::from_tcp_config(&TcpConfig::default())
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: (config.keepalive_secs > 0).then_some(config.keepalive_secs),
            keepalive_interval: (config.keepalive_interval > 0)
                .then_some(config.keepalive_interval),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}
