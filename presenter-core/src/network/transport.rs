//! Byte transport underneath a [`Connection`].
//!
//! The transport only moves bytes: exact-length sends and receives, with a
//! deadline on receive. It never retries; reconnect policy lives in the
//! channel supervisor.
//!
//! [`Connection`]: crate::network::Connection

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::PresenterError;

/// Default deadline for establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

// ── Traits ───────────────────────────────────────────────────────

/// A connected, bidirectional byte stream.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write every byte of `data`.
    async fn send(&self, data: &[u8]) -> Result<(), PresenterError>;

    /// Fill `buf` completely.
    ///
    /// Returns [`PresenterError::SocketTimeout`] when `timeout` elapses
    /// before any byte arrives. A deadline hit after a partial read, EOF,
    /// or an I/O failure is [`PresenterError::Connection`].
    async fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<(), PresenterError>;
}

/// Opens transports to a remote endpoint.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, PresenterError>;
}

// ── StreamTransport ──────────────────────────────────────────────

/// [`Transport`] over any tokio stream, split so a send and a receive
/// can be in flight at the same time.
pub struct StreamTransport<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    peer: String,
}

pub type TcpTransport = StreamTransport<TcpStream>;

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer: peer.into(),
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&self, data: &[u8]) -> Result<(), PresenterError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self, buf: &mut [u8], timeout: Duration) -> Result<(), PresenterError> {
        let mut reader = self.reader.lock().await;
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            match tokio::time::timeout_at(deadline, reader.read(&mut buf[filled..])).await {
                Ok(Ok(0)) => {
                    debug!(peer = %self.peer, filled, "peer closed mid-receive");
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
                }
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => {
                    debug!(peer = %self.peer, error = %e, "receive failed");
                    return Err(e.into());
                }
                Err(_) if filled == 0 => return Err(PresenterError::SocketTimeout(timeout)),
                // Bytes already consumed: the stream can no longer be resynced.
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("read {filled} of {} bytes before {timeout:?} deadline", buf.len()),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }
}

// ── TcpTransportFactory ──────────────────────────────────────────

/// Connects plain TCP transports with a connect deadline.
#[derive(Debug, Clone)]
pub struct TcpTransportFactory {
    connect_timeout: Duration,
}

impl Default for TcpTransportFactory {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TcpTransportFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl TransportFactory for TcpTransportFactory {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Transport>, PresenterError> {
        let peer = format!("{host}:{port}");
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect to {peer} timed out after {:?}", self.connect_timeout),
                )
            })??;
        stream.set_nodelay(true)?;
        info!(%peer, "tcp connection established");
        Ok(Box::new(TcpTransport::new(stream, peer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn stream_transport_moves_exact_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(b"hello")
            .read(&[1, 2, 3, 4])
            .build();
        let transport = StreamTransport::new(mock, "mock");

        transport.send(b"hello").await.unwrap();
        let mut buf = [0u8; 4];
        transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn receive_times_out_when_peer_is_silent() {
        let (ours, _theirs) = tokio::io::duplex(64);
        let transport = StreamTransport::new(ours, "duplex");

        let mut buf = [0u8; 4];
        let err = transport
            .receive(&mut buf, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SocketTimeout);
    }

    #[tokio::test]
    async fn partial_read_at_deadline_is_connection_error() {
        let (ours, mut theirs) = tokio::io::duplex(64);
        let transport = StreamTransport::new(ours, "duplex");

        theirs.write_all(&[0, 0]).await.unwrap();
        let mut buf = [0u8; 4];
        let err = transport
            .receive(&mut buf, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn receive_assembles_bytes_arriving_in_pieces() {
        let (ours, mut theirs) = tokio::io::duplex(64);
        let transport = StreamTransport::new(ours, "duplex");

        let writer = tokio::spawn(async move {
            theirs.write_all(&[1, 2]).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            theirs.write_all(&[3, 4]).await.unwrap();
            theirs
        });
        let mut buf = [0u8; 4];
        transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn receive_reports_eof_as_connection_error() {
        let (ours, theirs) = tokio::io::duplex(64);
        drop(theirs);
        let transport = StreamTransport::new(ours, "duplex");

        let mut buf = [0u8; 4];
        let err = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn tcp_factory_connects_and_refuses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let factory = TcpTransportFactory::default();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });
        assert!(factory.connect("127.0.0.1", port).await.is_ok());
        accept.await.unwrap();

        // Listener is gone now; the port refuses.
        let err = factory.connect("127.0.0.1", port).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }
}
