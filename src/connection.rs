//! A single client connection, plaintext or TLS.
//!
//! The socket is a closed sum over the two transports; send and recv
//! dispatch by match so the plain and TLS paths share all surrounding
//! logic. Lifecycle states form the lattice
//! `disconnected → connecting → connected ↔ active ↔ idle → closed`;
//! I/O requires `connected` or `active`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::HttpError;
use crate::metrics;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    /// Checked out for an in-flight exchange.
    Active,
    /// Parked in the pool, available for reuse.
    Idle,
    Closing,
    Closed,
}

enum Socket {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// A plaintext or TLS connection to one `(host, port)` endpoint.
pub struct Connection {
    host: String,
    port: u16,
    tls: bool,
    socket: Option<Socket>,
    state: ConnState,
    last_used: Instant,
    keepalive_count: u32,
}

impl Connection {
    /// Record the endpoint; performs no I/O.
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Connection {
            host: host.into(),
            port,
            tls,
            socket: None,
            state: ConnState::Disconnected,
            last_used: Instant::now(),
            keepalive_count: 0,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Number of exchanges this connection has served.
    pub fn keepalive_count(&self) -> u32 {
        self.keepalive_count
    }

    /// Milliseconds since the last successful I/O or idle parking.
    pub fn idle_ms(&self) -> u64 {
        self.last_used.elapsed().as_millis() as u64
    }

    /// True while the connection can still carry an exchange.
    pub fn is_alive(&self) -> bool {
        matches!(
            self.state,
            ConnState::Connected | ConnState::Active | ConnState::Idle
        )
    }

    /// Resolve the host, open the TCP socket, and handshake TLS when the
    /// endpoint requires it.
    ///
    /// IPv4/IPv6 literals (brackets accepted) skip DNS; otherwise the
    /// first resolved address is used.
    pub async fn connect(&mut self, tls_config: &Arc<rustls::ClientConfig>) -> Result<(), HttpError> {
        if self.state != ConnState::Disconnected {
            return Err(HttpError::AlreadyConnected);
        }
        self.state = ConnState::Connecting;

        // bracketed IPv6 literals lose their brackets for resolution and SNI
        let bare = self
            .host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
            .to_string();

        let stream = match self.open_tcp(&bare).await {
            Ok(s) => s,
            Err(e) => {
                self.state = ConnState::Closed;
                return Err(e);
            }
        };

        if self.tls {
            match self.handshake(&bare, stream, tls_config).await {
                Ok(tls) => self.socket = Some(Socket::Tls(Box::new(tls))),
                Err(e) => {
                    self.state = ConnState::Closed;
                    return Err(e);
                }
            }
        } else {
            self.socket = Some(Socket::Plain(stream));
        }

        self.state = ConnState::Connected;
        self.last_used = Instant::now();
        metrics::CONNECTIONS_OPENED.increment();
        debug!(
            "connected to {}:{} (tls={})",
            self.host, self.port, self.tls
        );
        Ok(())
    }

    async fn open_tcp(&self, bare: &str) -> Result<TcpStream, HttpError> {
        let stream = match bare.parse::<IpAddr>() {
            Ok(ip) => TcpStream::connect((ip, self.port)).await?,
            Err(_) => {
                let mut addrs = tokio::net::lookup_host((bare, self.port))
                    .await
                    .map_err(|_| HttpError::NoAddressFound(self.host.clone()))?;
                let addr = addrs
                    .next()
                    .ok_or_else(|| HttpError::NoAddressFound(self.host.clone()))?;
                TcpStream::connect(addr).await?
            }
        };
        Ok(stream)
    }

    async fn handshake(
        &self,
        bare: &str,
        stream: TcpStream,
        tls_config: &Arc<rustls::ClientConfig>,
    ) -> Result<TlsStream<TcpStream>, HttpError> {
        let name = ServerName::try_from(bare.to_string())
            .map_err(|_| HttpError::TlsHandshake(format!("invalid server name: {bare}")))?;
        let connector = TlsConnector::from(tls_config.clone());
        connector
            .connect(name, stream)
            .await
            .map_err(|e| HttpError::TlsHandshake(e.to_string()))
    }

    /// Write all of `data`, suspending as the socket backpressures.
    pub async fn send_all(&mut self, data: &[u8]) -> Result<(), HttpError> {
        self.check_io_state()?;
        let socket = self.socket.as_mut().ok_or(HttpError::NotConnected)?;
        let result = match socket {
            Socket::Plain(s) => s.write_all(data).await,
            Socket::Tls(s) => s.write_all(data).await,
        };
        match result {
            Ok(()) => {
                self.last_used = Instant::now();
                metrics::BYTES_SENT.add(data.len() as u64);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WriteZero => {
                self.close();
                Err(HttpError::ConnectionClosed)
            }
            Err(e) => {
                self.close();
                Err(HttpError::Io(e))
            }
        }
    }

    /// Read some bytes. A clean peer close is an error here, since callers on
    /// this path expect more framing. Streamers use
    /// [`recv_some`](Connection::recv_some) instead.
    pub async fn recv_all(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let n = self.recv_some(buf).await?;
        if n == 0 {
            return Err(HttpError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Read some bytes; `Ok(0)` means the peer closed cleanly.
    pub async fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        self.check_io_state()?;
        let socket = self.socket.as_mut().ok_or(HttpError::NotConnected)?;
        let result = match socket {
            Socket::Plain(s) => s.read(buf).await,
            Socket::Tls(s) => s.read(buf).await,
        };
        match result {
            Ok(0) => {
                trace!("{}:{} closed by peer", self.host, self.port);
                self.close();
                Ok(0)
            }
            Ok(n) => {
                self.last_used = Instant::now();
                metrics::BYTES_RECEIVED.add(n as u64);
                Ok(n)
            }
            Err(e) => {
                self.close();
                Err(HttpError::Io(e))
            }
        }
    }

    /// Transition into the in-flight exchange state and count the use.
    pub(crate) fn activate(&mut self) {
        self.state = ConnState::Active;
        self.keepalive_count += 1;
    }

    /// Park the connection for reuse, stamping the idle clock.
    pub(crate) fn park(&mut self) {
        self.state = ConnState::Idle;
        self.last_used = Instant::now();
    }

    /// Close the socket. Idempotent; also runs implicitly on drop.
    pub fn close(&mut self) {
        if self.state == ConnState::Closed {
            return;
        }
        self.state = ConnState::Closing;
        if self.socket.take().is_some() {
            metrics::CONNECTIONS_CLOSED.increment();
        }
        self.state = ConnState::Closed;
    }

    fn check_io_state(&self) -> Result<(), HttpError> {
        match self.state {
            ConnState::Connected | ConnState::Active => Ok(()),
            _ => Err(HttpError::NotConnected),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("state", &self.state)
            .field("keepalive_count", &self.keepalive_count)
            .finish()
    }
}
