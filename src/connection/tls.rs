//! TLS support for secure connections
//!
//! Uses rustls with the system root store plus an optional extra trusted root.

use crate::error::ConnectionError;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

/// TLS stream type alias
pub type TlsStream = tokio_rustls::client::TlsStream<TcpStream>;

/// Build a connector trusting the system roots and `trusted_root` if given
pub fn build_connector(trusted_root: Option<&Path>) -> Result<TlsConnector, ConnectionError> {
    let mut root_store = RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    for cert in native_certs.certs {
        root_store.add(cert).ok();
    }

    if let Some(root_path) = trusted_root {
        let file = std::fs::File::open(root_path).map_err(|e| {
            ConnectionError::Tls(format!(
                "Failed to open certificate file {}: {}",
                root_path.display(),
                e
            ))
        })?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                ConnectionError::Tls(format!(
                    "Failed to parse certificates from {}: {}",
                    root_path.display(),
                    e
                ))
            })?;
        for cert in certs {
            root_store
                .add(cert)
                .map_err(|e| ConnectionError::Tls(format!("Failed to add certificate: {}", e)))?;
        }
    }

    let tls_config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(tls_config)))
}

/// Run the TLS handshake over an established TCP stream
pub async fn handshake(
    connector: &TlsConnector,
    host: &str,
    stream: TcpStream,
) -> Result<TlsStream, ConnectionError> {
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ConnectionError::Tls(format!("Invalid hostname {}: {}", host, e)))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ConnectionError::Tls(format!("TLS handshake failed with {}: {}", host, e)))
}
