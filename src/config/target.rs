//! Target configuration types
//!
//! One `[[targets]]` entry per remote server.

use super::TcpConfig;
use crate::connection::{ChunkedMode, ConnectionSettings, Priority};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_user() -> String {
    "default".to_string()
}

fn default_client_name() -> String {
    crate::NAME.to_string()
}

fn default_compression() -> bool {
    true
}

/// One remote server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TargetConfig {
    /// Server host name or address
    pub host: String,

    /// Server port
    pub port: u16,

    /// User name
    #[serde(default = "default_user")]
    pub user: String,

    /// Password
    #[serde(default)]
    pub password: String,

    /// Default database
    #[serde(default)]
    pub database: String,

    /// Framing used when sending
    #[serde(default)]
    pub proto_send_chunked: ChunkedMode,

    /// Framing accepted when receiving
    #[serde(default)]
    pub proto_recv_chunked: ChunkedMode,

    /// Quota identifier
    #[serde(default)]
    pub quota_key: String,

    /// Cluster name for inter-server authentication
    #[serde(default)]
    pub cluster: String,

    /// Inter-server secret
    #[serde(default)]
    pub cluster_secret: String,

    /// Client identity string
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Compress data on the wire
    #[serde(default = "default_compression")]
    pub compression: bool,

    /// Use TLS
    #[serde(default)]
    pub secure: bool,

    /// Local address to bind
    #[serde(default)]
    pub bind_host: String,

    /// Replica priority (lower is preferred)
    #[serde(default)]
    pub priority: Priority,

    /// Extra trusted root certificate (PEM)
    #[serde(default)]
    pub tls_trusted_root: Option<PathBuf>,

    /// Socket tuning
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl TargetConfig {
    /// `host:port` composite
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection settings described by this target
    pub fn to_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            host: self.host.clone(),
            port: self.port,
            default_database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            proto_send_chunked: self.proto_send_chunked,
            proto_recv_chunked: self.proto_recv_chunked,
            quota_key: self.quota_key.clone(),
            cluster: self.cluster.clone(),
            cluster_secret: self.cluster_secret.clone(),
            client_name: self.client_name.clone(),
            compression: self.compression.into(),
            secure: self.secure.into(),
            bind_host: self.bind_host.clone(),
            tcp: self.tcp.clone(),
            tls_trusted_root: self.tls_trusted_root.clone(),
        }
    }

    /// Validate the target
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("target host must not be empty".to_string());
        }
        if self.port == 0 {
            return Err(format!("target {} has port 0", self.host));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Compression, Secure};

    #[test]
    fn test_target_defaults() {
        let target: TargetConfig = toml::from_str(
            r#"
host = "db1"
port = 9000
"#,
        )
        .unwrap();

        assert_eq!(target.user, "default");
        assert_eq!(target.client_name, "connpool");
        assert!(target.compression);
        assert!(!target.secure);
        assert_eq!(target.priority, Priority(1));
        assert_eq!(target.address(), "db1:9000");
    }

    #[test]
    fn test_target_to_settings() {
        let target: TargetConfig = toml::from_str(
            r#"
host = "db1"
port = 9440
user = "reader"
database = "metrics"
proto_send_chunked = "chunked"
compression = false
secure = true
bind_host = "10.0.0.5"
priority = 3
"#,
        )
        .unwrap();

        let settings = target.to_settings();
        assert_eq!(settings.address(), "db1:9440");
        assert_eq!(settings.user, "reader");
        assert_eq!(settings.default_database, "metrics");
        assert_eq!(settings.proto_send_chunked, ChunkedMode::Chunked);
        assert_eq!(settings.proto_recv_chunked, ChunkedMode::NotChunked);
        assert_eq!(settings.compression, Compression::Disable);
        assert_eq!(settings.secure, Secure::Enable);
        assert_eq!(settings.bind_host, "10.0.0.5");
        assert_eq!(target.priority, Priority(3));
    }

    #[test]
    fn test_target_validate() {
        let mut target: TargetConfig = toml::from_str("host = \"db1\"\nport = 9000").unwrap();
        assert!(target.validate().is_ok());

        target.port = 0;
        assert!(target.validate().unwrap_err().contains("port 0"));

        target.port = 9000;
        target.host = " ".to_string();
        assert!(target.validate().is_err());
    }
}
