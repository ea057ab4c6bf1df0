#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use apnscrab::gateway::{Dialer, GatewayStream, Passthrough};
use apnscrab::wire_protocol::{FrameFormat, NotificationFrame, WireSerializable};
use apnscrab::{ApnsClient, ApnsConfig, PoolSettings};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf, duplex};
use tokio::time::sleep;

pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

// -----------------------------------------------------------------------------
// ----- Fixtures --------------------------------------------------------------

pub const FIXTURE_PASSPHRASE: &str = "hunter2";

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn fixture_bytes(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).expect("read fixture")
}

// -----------------------------------------------------------------------------
// ----- MockGateway -----------------------------------------------------------

/// What the gateway does on one dialed connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// Accepts every frame and never answers.
    Silent,
    /// Answers the first frame with this status, echoing its identifier,
    /// then hangs up.
    Respond(u8),
    /// Answers the first frame with this status and identifier, then hangs up.
    RespondAs(u8, u32),
    /// Hangs up right after reading the first frame.
    CloseAfterFrame,
    /// Hangs up before reading anything.
    DropImmediately,
    /// Answers the first frame with only the first bytes of an error frame,
    /// then hangs up.
    Truncated(usize),
    /// Accepts frames, but every read on the client side fails with a reset.
    ResetOnRead,
    /// The dial itself fails.
    Refuse,
}

/// In-process gateway. Each dial takes the next scripted behavior, falling
/// back to `fallback` once the script runs out.
#[derive(Debug)]
pub struct MockGateway {
    script: Mutex<VecDeque<Behavior>>,
    fallback: Behavior,
    dials: AtomicUsize,
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    hangups: Arc<AtomicUsize>,
}

impl MockGateway {
    pub fn new(script: impl IntoIterator<Item = Behavior>, fallback: Behavior) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            dials: AtomicUsize::new(0),
            frames: Arc::new(Mutex::new(Vec::new())),
            hangups: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn always(behavior: Behavior) -> Arc<Self> {
        Self::new([], behavior)
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().clone()
    }

    /// Frames are recorded by the gateway task; give it a moment to catch up.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<Vec<u8>> {
        for _ in 0..50 {
            if self.frames.lock().len() >= count {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.frames()
    }

    /// Connections the client ended cleanly while the gateway was still
    /// listening.
    pub fn hangups(&self) -> usize {
        self.hangups.load(Ordering::SeqCst)
    }

    pub async fn wait_for_hangups(&self, count: usize) -> usize {
        for _ in 0..50 {
            if self.hangups() >= count {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.hangups()
    }
}

#[async_trait]
impl Dialer for MockGateway {
    async fn dial(&self, _address: &str) -> io::Result<GatewayStream> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let behavior = self.script.lock().pop_front().unwrap_or(self.fallback);

        if behavior == Behavior::Refuse {
            return Err(io::ErrorKind::ConnectionRefused.into());
        }

        let (client, server) = duplex(8 * 1024);
        if behavior == Behavior::DropImmediately {
            drop(server);
        } else {
            let recorder = Recorder {
                frames: self.frames.clone(),
                hangups: self.hangups.clone(),
            };
            tokio::spawn(serve(server, behavior, recorder));
        }

        if behavior == Behavior::ResetOnRead {
            return Ok(Box::new(ResetOnRead(client)));
        }
        Ok(Box::new(client))
    }
}

struct Recorder {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    hangups: Arc<AtomicUsize>,
}

async fn serve(mut server: DuplexStream, behavior: Behavior, recorder: Recorder) {
    let mut buf = Vec::new();

    while let Some(frame) = read_notification(&mut server, &mut buf).await {
        let identifier = NotificationFrame::from_bytes(&frame)
            .map(|f| f.identifier)
            .unwrap_or_default();
        recorder.frames.lock().push(frame);

        match behavior {
            Behavior::Silent | Behavior::ResetOnRead => continue,
            Behavior::Respond(status) => {
                let _ = server.write_all(&error_frame(status, identifier)).await;
            }
            Behavior::RespondAs(status, identifier) => {
                let _ = server.write_all(&error_frame(status, identifier)).await;
            }
            Behavior::Truncated(len) => {
                let frame = error_frame(8, identifier);
                let _ = server.write_all(&frame[..len.min(frame.len())]).await;
            }
            Behavior::CloseAfterFrame | Behavior::DropImmediately | Behavior::Refuse => {}
        }
        return;
    }

    recorder.hangups.fetch_add(1, Ordering::SeqCst);
}

/// Client half whose reads fail as if the peer reset the connection.
struct ResetOnRead(DuplexStream);

impl AsyncRead for ResetOnRead {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
    }
}

impl AsyncWrite for ResetOnRead {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

pub async fn read_notification<S>(stream: &mut S, buf: &mut Vec<u8>) -> Option<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(len) = NotificationFrame::peek(buf) {
            return Some(buf.drain(..len).collect());
        }
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

pub fn error_frame(status: u8, identifier: u32) -> [u8; 6] {
    let id = identifier.to_be_bytes();
    [8, status, id[0], id[1], id[2], id[3]]
}

pub async fn write_all<S: AsyncWrite + Unpin>(stream: &mut S, bytes: &[u8]) {
    stream.write_all(bytes).await.expect("gateway write");
    stream.flush().await.expect("gateway flush");
}

// -----------------------------------------------------------------------------
// ----- Clients ---------------------------------------------------------------

pub fn pool_settings(size: usize, frame_format: FrameFormat) -> PoolSettings {
    PoolSettings {
        size,
        read_timeout: READ_TIMEOUT,
        connect_timeout: None,
        idle_timeout: None,
        retries: 3,
        frame_format,
    }
}

/// Client wired to `gateway` with a pass-through handshake. The certificate
/// file is never read.
pub fn mock_client(gateway: Arc<MockGateway>, size: usize) -> ApnsClient {
    mock_client_with(gateway, pool_settings(size, FrameFormat::Enhanced))
}

pub fn mock_client_with(gateway: Arc<MockGateway>, pool: PoolSettings) -> ApnsClient {
    let config = ApnsConfig::new("unused.pem", "")
        .with_gateway("gateway.test", 2195)
        .with_pool(pool);

    ApnsClient::new(config)
        .with_dialer(gateway)
        .with_handshake(Arc::new(Passthrough))
}

pub const DEVICE_TOKEN: &str = "7f2b0c5e1d3a49f6b8e2c4d6a1f3e5b79d0c2e4f6a8b1c3d5e7f90a2b4c6d8e0";

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
