use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::tls::Handshake;
use crate::wire_protocol::ERROR_RESPONSE_LEN;

// -----------------------------------------------------------------------------
// ----- GatewayStream ---------------------------------------------------------

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// A bidirectional byte stream to the gateway, raw or already wrapped in TLS.
pub type GatewayStream = Box<dyn AsyncStream>;

// -----------------------------------------------------------------------------
// ----- Dialer ----------------------------------------------------------------

#[async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    async fn dial(&self, address: &str) -> io::Result<GatewayStream>;
}

#[derive(Clone, Debug, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str) -> io::Result<GatewayStream> {
        let stream = match self.connect_timeout {
            Some(limit) => timeout(limit, TcpStream::connect(address))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
            None => TcpStream::connect(address).await?,
        };
        stream.set_nodelay(true)?;

        Ok(Box::new(stream))
    }
}

// -----------------------------------------------------------------------------
// ----- ConnectionSettings ----------------------------------------------------

/// Everything a connection needs to (re)establish itself. Shared by all
/// connections of a pool.
#[derive(Debug)]
pub struct ConnectionSettings {
    pub address: String,
    pub read_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub dialer: Arc<dyn Dialer>,
    pub handshake: Arc<dyn Handshake>,
}

// -----------------------------------------------------------------------------
// ----- Connection ------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Outcome of waiting for the gateway after a write.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Nothing arrived before the read deadline.
    Silent,
    /// Clean end of stream before any byte arrived.
    Closed,
    /// Response bytes; fewer than a full frame if the stream ended or the
    /// deadline passed mid-frame.
    Frame(Vec<u8>),
    Failed(io::Error),
}

pub struct Connection {
    settings: Arc<ConnectionSettings>,
    stream: Option<GatewayStream>,
    state: ConnectionState,
    last_used: Option<Instant>,
}

// -----------------------------------------------------------------------------
// ----- Connection: Static ----------------------------------------------------

impl Connection {
    pub fn new(settings: Arc<ConnectionSettings>) -> Self {
        Self {
            settings,
            stream: None,
            state: ConnectionState::Disconnected,
            last_used: None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Public ----------------------------------------------------

impl Connection {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn address(&self) -> &str {
        &self.settings.address
    }

    /// Dials and handshakes unless already connected. On failure the
    /// connection stays disconnected.
    pub async fn connect(&mut self) -> io::Result<()> {
        if self.is_connected() {
            if !self.idle_expired() {
                return Ok(());
            }
            debug!(
                address = %self.settings.address,
                "recycling idle gateway connection"
            );
            self.mark_disconnected();
        }

        // Stale transport from a broken connection is replaced, never reused.
        self.stream = None;

        let raw = self.settings.dialer.dial(&self.settings.address).await?;
        let stream = self.settings.handshake.handshake(raw).await?;

        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        self.last_used = Some(Instant::now());

        info!(address = %self.settings.address, "connected to gateway");
        Ok(())
    }

    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let result = match self.stream.as_mut() {
            Some(stream) if self.state == ConnectionState::Connected => {
                write_and_flush(stream, frame).await
            }
            _ => Err(io::Error::new(io::ErrorKind::NotConnected, "connection is not open")),
        };

        match result {
            Ok(()) => self.last_used = Some(Instant::now()),
            Err(_) => self.mark_disconnected(),
        }

        result
    }

    /// Waits at most the read timeout for an error response. Anything other
    /// than silence or a complete frame leaves the connection disconnected,
    /// including a frame still incomplete at the deadline.
    pub async fn read_response(&mut self) -> ReadOutcome {
        let Some(stream) = self.stream.as_mut() else {
            self.mark_disconnected();
            return ReadOutcome::Failed(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is not open",
            ));
        };

        let mut buf = Vec::with_capacity(ERROR_RESPONSE_LEN);
        let deadline = self.settings.read_timeout;
        let read = timeout(deadline, read_frame(stream, &mut buf)).await;

        let outcome = match read {
            Err(_elapsed) if buf.is_empty() => ReadOutcome::Silent,
            Err(_elapsed) => {
                debug!(read = buf.len(), "read deadline hit mid error frame");
                ReadOutcome::Frame(buf)
            }
            Ok(Ok(())) if buf.is_empty() => ReadOutcome::Closed,
            Ok(Ok(())) => ReadOutcome::Frame(buf),
            Ok(Err(err)) => ReadOutcome::Failed(err),
        };

        let stream_ended = match &outcome {
            ReadOutcome::Closed | ReadOutcome::Failed(_) => true,
            ReadOutcome::Frame(buf) => buf.len() < ERROR_RESPONSE_LEN,
            ReadOutcome::Silent => false,
        };
        if stream_ended {
            self.mark_disconnected();
        }

        outcome
    }

    /// The stream is kept until the next `connect()` replaces it.
    pub fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.mark_disconnected();
    }
}

// -----------------------------------------------------------------------------
// ----- Connection: Private ---------------------------------------------------

impl Connection {
    fn idle_expired(&self) -> bool {
        match (self.settings.idle_timeout, self.last_used) {
            (Some(limit), Some(at)) => at.elapsed() > limit,
            _ => false,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.settings.address)
            .field("state", &self.state)
            .field("has_stream", &self.stream.is_some())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

async fn write_and_flush(stream: &mut GatewayStream, frame: &[u8]) -> io::Result<()> {
    stream.write_all(frame).await?;
    stream.flush().await
}

/// Reads into `buf` until a full error response is buffered or the stream
/// ends. Bytes read so far stay in `buf` if the future is dropped.
async fn read_frame(stream: &mut GatewayStream, buf: &mut Vec<u8>) -> io::Result<()> {
    let mut chunk = [0u8; ERROR_RESPONSE_LEN];

    while buf.len() < ERROR_RESPONSE_LEN {
        let want = ERROR_RESPONSE_LEN - buf.len();
        let n = stream.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
