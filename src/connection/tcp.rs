//! TCP connection implementation
//!
//! Plain TCP connections, upgraded to TLS when the settings ask for a secure
//! transport.

#[cfg(feature = "rustls-tls")]
use super::tls::{self, TlsStream};
use super::{Connection, ConnectionSettings, ConnectionTimeouts, Secure, SocketOpts};
use crate::error::ConnectionError;
use async_trait::async_trait;
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

/// An established byte stream to the server
#[derive(Debug)]
pub enum ConnStream {
    /// Plain TCP
    Plain(TcpStream),
    /// TLS over TCP
    #[cfg(feature = "rustls-tls")]
    Tls(Box<TlsStream>),
}

impl ConnStream {
    /// The underlying TCP socket
    pub fn tcp(&self) -> &TcpStream {
        match self {
            ConnStream::Plain(stream) => stream,
            #[cfg(feature = "rustls-tls")]
            ConnStream::Tls(stream) => stream.get_ref().0,
        }
    }

    /// Check an idle socket without consuming anything from it
    ///
    /// Fails on a pending socket error or when the peer already closed its
    /// side. Bytes waiting to be read count as alive.
    fn check_alive(&self) -> io::Result<()> {
        let socket = socket2::SockRef::from(self.tcp());
        if let Some(e) = socket.take_error()? {
            return Err(e);
        }

        let mut buf = [MaybeUninit::<u8>::uninit(); 1];
        match socket.peek(&mut buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl AsyncRead for ConnStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "rustls-tls")]
            ConnStream::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            ConnStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "rustls-tls")]
            ConnStream::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "rustls-tls")]
            ConnStream::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            ConnStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "rustls-tls")]
            ConnStream::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Lazily established connection to one server
pub struct TcpConnection {
    /// Target and identity
    settings: ConnectionSettings,
    /// Socket options applied after connect
    socket_opts: SocketOpts,
    /// Established stream, if any
    stream: Option<ConnStream>,
    /// TLS connector, built on the first secure connect
    #[cfg(feature = "rustls-tls")]
    connector: Option<tokio_rustls::TlsConnector>,
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("address", &self.settings.address())
            .field("secure", &self.settings.secure)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

impl TcpConnection {
    /// Settings this connection was built from
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// The established stream, if connected
    pub fn stream_mut(&mut self) -> Option<&mut ConnStream> {
        self.stream.as_mut()
    }

    /// Remote socket address, if connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.tcp().peer_addr().ok())
    }

    /// Drop the established stream; the next `force_connected` reconnects
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Disconnected from {}", self.settings.address());
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, ConnectionError> {
        let address = self.settings.address();
        tokio::net::lookup_host((self.settings.host.as_str(), self.settings.port))
            .await
            .map_err(|source| ConnectionError::Resolve {
                address: address.clone(),
                source,
            })?
            .next()
            .ok_or(ConnectionError::NoAddress(address))
    }

    fn socket_for(&self, remote: &SocketAddr) -> Result<TcpSocket, ConnectionError> {
        let socket = if remote.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        let bind_host = self.settings.bind_host.as_str();
        if !bind_host.is_empty() {
            let bind_err = |source: io::Error| ConnectionError::Bind {
                address: bind_host.to_string(),
                source,
            };
            let local: IpAddr = bind_host
                .parse()
                .map_err(|e| bind_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
            socket.bind(SocketAddr::new(local, 0)).map_err(bind_err)?;
        }

        Ok(socket)
    }

    async fn connect(&mut self, timeouts: &ConnectionTimeouts) -> Result<ConnStream, ConnectionError> {
        let address = self.settings.address();
        if cfg!(not(feature = "rustls-tls")) && self.settings.secure == Secure::Enable {
            return Err(ConnectionError::SecureUnsupported(address));
        }

        let remote = self.resolve().await?;
        let socket = self.socket_for(&remote)?;

        let tcp = tokio::time::timeout(timeouts.connect, socket.connect(remote))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout {
                address: address.clone(),
                timeout: timeouts.connect,
            })?
            .map_err(|source| ConnectionError::Connect {
                address: address.clone(),
                source,
            })?;

        self.socket_opts.apply(&tcp)?;

        match self.settings.secure {
            Secure::Disable => {
                debug!("TCP connection established to {} ({})", address, remote);
                Ok(ConnStream::Plain(tcp))
            }
            Secure::Enable => {
                let stream = self.upgrade(tcp, timeouts).await?;
                debug!("TLS connection established to {} ({})", address, remote);
                Ok(stream)
            }
        }
    }

    #[cfg(feature = "rustls-tls")]
    async fn upgrade(
        &mut self,
        tcp: TcpStream,
        timeouts: &ConnectionTimeouts,
    ) -> Result<ConnStream, ConnectionError> {
        let connector = match self.connector.take() {
            Some(connector) => connector,
            None => tls::build_connector(self.settings.tls_trusted_root.as_deref())?,
        };
        let handshake = tokio::time::timeout(
            timeouts.connect,
            tls::handshake(&connector, &self.settings.host, tcp),
        )
        .await;
        self.connector = Some(connector);

        let stream = handshake.map_err(|_| ConnectionError::ConnectTimeout {
            address: self.settings.address(),
            timeout: timeouts.connect,
        })??;
        Ok(ConnStream::Tls(Box::new(stream)))
    }

    #[cfg(not(feature = "rustls-tls"))]
    async fn upgrade(
        &mut self,
        _tcp: TcpStream,
        _timeouts: &ConnectionTimeouts,
    ) -> Result<ConnStream, ConnectionError> {
        Err(ConnectionError::SecureUnsupported(self.settings.address()))
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn from_settings(settings: &ConnectionSettings) -> Self {
        TcpConnection {
            settings: settings.clone(),
            socket_opts: SocketOpts::from_tcp_config(&settings.tcp),
            stream: None,
            #[cfg(feature = "rustls-tls")]
            connector: None,
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn force_connected(
        &mut self,
        timeouts: &ConnectionTimeouts,
    ) -> Result<(), ConnectionError> {
        if let Some(stream) = &self.stream {
            match stream.check_alive() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(
                        "Dropping broken connection to {}: {}",
                        self.settings.address(),
                        e
                    );
                    self.stream = None;
                }
            }
        }

        let stream = self.connect(timeouts).await?;
        self.stream = Some(stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local_settings(port: u16) -> ConnectionSettings {
        ConnectionSettings::new("127.0.0.1", port)
    }

    #[test]
    fn test_from_settings_does_not_connect() {
        let conn = TcpConnection::from_settings(&local_settings(9000));
        assert!(!conn.is_connected());
        assert!(conn.peer_addr().is_none());
        assert_eq!(conn.settings().address(), "127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_force_connected_and_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
            socket
        });

        let mut conn = TcpConnection::from_settings(&local_settings(port));
        conn.force_connected(&ConnectionTimeouts::default())
            .await
            .unwrap();
        assert!(conn.is_connected());
        assert_eq!(conn.peer_addr().unwrap().port(), port);

        let stream = conn.stream_mut().unwrap();
        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let _server_side = server.await.unwrap();

        // An established, healthy socket is kept as is
        conn.force_connected(&ConnectionTimeouts::default())
            .await
            .unwrap();
        assert!(conn.is_connected());

        conn.disconnect();
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_force_connected_replaces_peer_closed_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut conn = TcpConnection::from_settings(&local_settings(port));
        conn.force_connected(&ConnectionTimeouts::default())
            .await
            .unwrap();
        let (first, _) = listener.accept().await.unwrap();
        let first_local = conn.stream_mut().unwrap().tcp().local_addr().unwrap();

        // The server closes cleanly; no socket error is raised on our side
        drop(first);
        tokio::time::sleep(Duration::from_millis(100)).await;

        conn.force_connected(&ConnectionTimeouts::default())
            .await
            .unwrap();
        let (_second, _) = listener.accept().await.unwrap();
        let second_local = conn.stream_mut().unwrap().tcp().local_addr().unwrap();
        assert_ne!(first_local, second_local);
    }

    #[tokio::test]
    async fn test_force_connected_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut conn = TcpConnection::from_settings(&local_settings(port));
        let timeouts = ConnectionTimeouts::default().with_connect(Duration::from_millis(500));
        let result = conn.force_connected(&timeouts).await;

        assert!(result.is_err());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_invalid_bind_host() {
        let mut settings = local_settings(9000);
        settings.bind_host = "not-an-ip".to_string();

        let mut conn = TcpConnection::from_settings(&settings);
        let result = conn.force_connected(&ConnectionTimeouts::default()).await;

        assert!(matches!(result, Err(ConnectionError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_bind_host_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut settings = local_settings(port);
        settings.bind_host = "127.0.0.1".to_string();

        let mut conn = TcpConnection::from_settings(&settings);
        conn.force_connected(&ConnectionTimeouts::default())
            .await
            .unwrap();
        assert!(conn.is_connected());

        let (_socket, peer) = listener.accept().await.unwrap();
        assert_eq!(peer.ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
    }
}
