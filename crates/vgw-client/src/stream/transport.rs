//! Event stream transport
//!
//! The channel talks to the gateway through [`EventTransport`]; the shipped
//! implementation is plain TCP. TLS or other carriers are provided by
//! implementing the trait around a pre-configured stream.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Transport layer errors
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection reset: {0}")]
    ConnectionReset(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused => TransportError::ConnectionRefused(err.to_string()),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                TransportError::ConnectionReset(err.to_string())
            }
            ErrorKind::TimedOut => TransportError::Timeout(err.to_string()),
            _ => TransportError::ReadFailed(err.to_string()),
        }
    }
}

/// Connects to the gateway's event stream
#[async_trait]
pub trait EventTransport: Send + Sync {
    fn host(&self) -> &str;

    fn port(&self) -> u16;

    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn EventConnection>, TransportError>;
}

/// One open event stream connection
///
/// `read_chunk` must be cancel-safe: the channel drops a pending read when
/// it is told to disconnect.
#[async_trait]
pub trait EventConnection: Send {
    /// Next chunk of bytes; `Ok(None)` when the peer closed the stream cleanly
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Close the connection. Idempotent; `graceful` shuts the write half
    /// down before dropping the socket.
    async fn close(&mut self, graceful: bool) -> Result<(), TransportError>;
}

/// Plain TCP transport
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl EventTransport for TcpTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn port(&self) -> u16 {
        self.port
    }

    async fn connect(&self) -> Result<Box<dyn EventConnection>, TransportError> {
        let addr = (self.host.as_str(), self.port);
        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| {
                    TransportError::Timeout(format!("connecting to {}:{}", self.host, self.port))
                })?,
            None => TcpStream::connect(addr).await,
        }
        .map_err(|e| match TransportError::from(e) {
            TransportError::ReadFailed(msg) => TransportError::ConnectionFailed(msg),
            other => other,
        })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(?e, "Failed to set TCP_NODELAY");
        }

        debug!(host = %self.host, port = self.port, "Event stream connected");
        Ok(Box::new(TcpConnection {
            stream: Some(stream),
        }))
    }
}

/// Open TCP event stream
pub struct TcpConnection {
    stream: Option<TcpStream>,
}

#[async_trait]
impl EventConnection for TcpConnection {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        let mut buf = BytesMut::with_capacity(READ_CHUNK_SIZE);
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(buf.freeze()))
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::ConnectionClosed)?;
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn close(&mut self, graceful: bool) -> Result<(), TransportError> {
        if let Some(mut stream) = self.stream.take() {
            if graceful {
                stream
                    .shutdown()
                    .await
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
            }
        }
        Ok(())
    }
}
