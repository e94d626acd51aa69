//! Connection settings
//!
//! Everything a connection needs to reach and identify itself to a server.

use crate::config::TcpConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Opaque ordering hint for replica selection (lower is preferred)
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Priority(pub i64);

impl Default for Priority {
    fn default() -> Self {
        Priority(1)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether data is compressed on the wire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Compress data
    #[default]
    Enable,
    /// Send data as is
    Disable,
}

impl From<bool> for Compression {
    fn from(enabled: bool) -> Self {
        if enabled {
            Compression::Enable
        } else {
            Compression::Disable
        }
    }
}

/// Whether the transport is encrypted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Secure {
    /// TLS
    Enable,
    /// Plain TCP
    #[default]
    Disable,
}

impl From<bool> for Secure {
    fn from(enabled: bool) -> Self {
        if enabled {
            Secure::Enable
        } else {
            Secure::Disable
        }
    }
}

/// Protocol framing mode for one direction
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChunkedMode {
    /// Always chunked
    #[serde(rename = "chunked")]
    Chunked,
    /// Never chunked
    #[default]
    #[serde(rename = "notchunked")]
    NotChunked,
    /// Chunked unless the server refuses
    #[serde(rename = "chunked_optional")]
    ChunkedOptional,
    /// Not chunked unless the server requires it
    #[serde(rename = "notchunked_optional")]
    NotChunkedOptional,
}

impl ChunkedMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkedMode::Chunked => "chunked",
            ChunkedMode::NotChunked => "notchunked",
            ChunkedMode::ChunkedOptional => "chunked_optional",
            ChunkedMode::NotChunkedOptional => "notchunked_optional",
        }
    }
}

/// Full description of one target connection setup
///
/// Equality and hashing cover every field, so two settings that differ in
/// anything (even just compression) never share a pool.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionSettings {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Default database for the session
    pub default_database: String,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
    /// Framing used when sending
    pub proto_send_chunked: ChunkedMode,
    /// Framing accepted when receiving
    pub proto_recv_chunked: ChunkedMode,
    /// Quota identifier
    pub quota_key: String,
    /// Cluster name for inter-server authentication
    pub cluster: String,
    /// Shared secret for inter-server authentication
    pub cluster_secret: String,
    /// Client identity string
    pub client_name: String,
    /// Wire compression
    pub compression: Compression,
    /// Transport encryption
    pub secure: Secure,
    /// Local address to bind before connecting (empty for any)
    pub bind_host: String,
    /// Socket tuning
    pub tcp: TcpConfig,
    /// Extra trusted root certificate for secure connections
    pub tls_trusted_root: Option<PathBuf>,
}

impl ConnectionSettings {
    /// Settings for `host:port` with every other field at its default
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectionSettings {
            host: host.into(),
            port,
            default_database: String::new(),
            user: "default".to_string(),
            password: String::new(),
            proto_send_chunked: ChunkedMode::default(),
            proto_recv_chunked: ChunkedMode::default(),
            quota_key: String::new(),
            cluster: String::new(),
            cluster_secret: String::new(),
            client_name: crate::NAME.to_string(),
            compression: Compression::default(),
            secure: Secure::default(),
            bind_host: String::new(),
            tcp: TcpConfig::default(),
            tls_trusted_root: None,
        }
    }

    /// `host:port` composite
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("default_database", &self.default_database)
            .field("user", &self.user)
            .field("proto_send_chunked", &self.proto_send_chunked)
            .field("proto_recv_chunked", &self.proto_recv_chunked)
            .field("quota_key", &self.quota_key)
            .field("cluster", &self.cluster)
            .field("client_name", &self.client_name)
            .field("compression", &self.compression)
            .field("secure", &self.secure)
            .field("bind_host", &self.bind_host)
            .field("tcp", &self.tcp)
            .field("tls_trusted_root", &self.tls_trusted_root)
            .finish_non_exhaustive()
    }
}
