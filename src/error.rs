//! Error types for Connpool
//!
//! This module defines the errors surfaced by connections and pools.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while establishing or checking a connection
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Address resolution failed
    #[error("Failed to resolve {address}: {source}")]
    Resolve {
        /// Address being resolved
        address: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Resolution returned nothing usable
    #[error("No addresses found for {0}")]
    NoAddress(String),

    /// Binding the local address failed
    #[error("Failed to bind local address {address}: {source}")]
    Bind {
        /// Local address
        address: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// TCP connect failed
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        /// Remote address
        address: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// TCP connect did not complete in time
    #[error("Connection timeout to {address} after {timeout:?}")]
    ConnectTimeout {
        /// Remote address
        address: String,
        /// Configured connect timeout
        timeout: Duration,
    },

    /// TLS setup or handshake failed
    #[error("TLS error: {0}")]
    Tls(String),

    /// Secure transport was requested but TLS support is not compiled in
    #[error("Secure connection to {0} requested but TLS support is not enabled")]
    SecureUnsupported(String),

    /// IO error on an established connection
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors returned by pools and the registry
#[derive(Error, Debug)]
pub enum PoolError {
    /// No slot became free before the deadline
    #[error("Timeout waiting for connection to {address} (waited {waited:?})")]
    Timeout {
        /// Pool address
        address: String,
        /// How long the caller was willing to wait
        waited: Duration,
    },

    /// The connection could not be established or verified
    #[error("Connection to {address} failed: {source}")]
    Connection {
        /// Pool address
        address: String,
        /// Underlying connection error
        #[source]
        source: ConnectionError,
    },

    /// Every replica of a replica-aware pool failed
    #[error("All {count} replicas failed: {details}")]
    AllReplicasFailed {
        /// Number of replicas tried
        count: usize,
        /// Per-replica failure summary
        details: String,
    },

    /// Invalid pool configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// Whether this is the recoverable acquire timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, PoolError::Timeout { .. })
    }
}
