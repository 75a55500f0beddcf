//! TCP connection manager.

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::BytesMut;
use tankwire_protocol::{Frame, FrameDecoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::{
    ConnectionId, ConnectionState, DisconnectReason, InboundHandler, OutboundSink, TransportError,
};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Minimum free space in the receive buffer before each read.
const READ_CHUNK: usize = 4096;

/// A single client connection to the game server.
///
/// Created in [`ConnectionState::Disconnected`]; [`connect`](Self::connect)
/// may be called once. Dropping the connection closes it.
pub struct TcpConnection {
    addr: String,
    capacity: usize,
    connect_timeout: Duration,
    outbound: OnceLock<mpsc::Sender<Frame>>,
    peer: OnceLock<SocketAddr>,
    shared: Arc<Shared>,
}

/// State shared between the owner and both workers.
struct Shared {
    id: ConnectionId,
    state: AtomicU8,
    started: AtomicBool,
    /// Flipped to `true` once; both workers watch it.
    stop: watch::Sender<bool>,
    handler: OnceLock<Arc<dyn InboundHandler>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves to `Disconnected`, stops both workers, and notifies the handler
    /// if this call is the one that ended a live connection.
    fn disconnect(&self, reason: DisconnectReason) {
        let previous = ConnectionState::from_u8(self.state.swap(
            ConnectionState::Disconnected.as_u8(),
            Ordering::AcqRel,
        ));
        self.stop.send_replace(true);

        if previous != ConnectionState::Connected {
            return;
        }
        match &reason {
            DisconnectReason::Error(e) => {
                tracing::warn!(id = %self.id, error = %e, "connection lost");
            }
            other => {
                tracing::info!(id = %self.id, reason = %other, "disconnected");
            }
        }
        if let Some(handler) = self.handler.get() {
            handler.on_disconnect(&reason);
        }
    }
}

impl TcpConnection {
    /// Default bound on how long [`connect`](Self::connect) waits.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates an unconnected instance for `addr` (`host:port`) with an
    /// outbound queue holding at most `outbound_capacity` frames.
    pub fn new(addr: impl Into<String>, outbound_capacity: usize) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            addr: addr.into(),
            capacity: outbound_capacity.max(1),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            outbound: OnceLock::new(),
            peer: OnceLock::new(),
            shared: Arc::new(Shared {
                id: ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
                state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
                started: AtomicBool::new(false),
                stop,
                handler: OnceLock::new(),
            }),
        }
    }

    /// Sets how long `connect` waits for the TCP handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Opens the socket and starts the send and receive workers.
    ///
    /// `handler` receives every decoded frame and the single disconnect
    /// notification.
    pub async fn connect(&self, handler: Arc<dyn InboundHandler>) -> Result<(), TransportError> {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            return Err(TransportError::AlreadyStarted);
        }
        self.set_state(ConnectionState::Connecting);
        let _ = self.shared.handler.set(Arc::clone(&handler));

        let id = self.shared.id;
        tracing::debug!(%id, addr = %self.addr, "connecting");

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(self.addr.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.fail_connect(e)),
            Err(_) => {
                return Err(self.fail_connect(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no connection after {:?}", self.connect_timeout),
                )));
            }
        };

        // Control frames are tiny; don't let Nagle hold them back.
        if let Err(e) = stream.set_nodelay(true) {
            return Err(self.fail_connect(e));
        }
        if let Ok(peer) = stream.peer_addr() {
            let _ = self.peer.set(peer);
        }

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(self.capacity);
        let _ = self.outbound.set(tx);

        if self
            .shared
            .state
            .compare_exchange(
                ConnectionState::Connecting.as_u8(),
                ConnectionState::Connected.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(TransportError::ConnectionClosed("closed while connecting".into()));
        }
        tracing::info!(%id, addr = %self.addr, "connected");

        tokio::spawn(send_loop(Arc::clone(&self.shared), writer, rx));
        tokio::spawn(receive_loop(Arc::clone(&self.shared), reader, handler));
        Ok(())
    }

    /// Queues a frame for the send worker. Never blocks.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.enqueue(frame)
    }

    /// Stops both workers and releases the socket. Idempotent.
    pub fn close(&self) {
        self.shared.started.store(true, Ordering::Release);
        self.shared.disconnect(DisconnectReason::LocalClose);
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// The server's address, once connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer.get().copied()
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.state.store(state.as_u8(), Ordering::Release);
    }

    fn fail_connect(&self, error: std::io::Error) -> TransportError {
        self.set_state(ConnectionState::Disconnected);
        tracing::warn!(id = %self.shared.id, addr = %self.addr, error = %error, "connect failed");
        TransportError::ConnectFailed(error)
    }
}

impl OutboundSink for TcpConnection {
    fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let Some(queue) = self.outbound.get() else {
            return Err(TransportError::NotConnected);
        };
        match queue.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                tracing::warn!(
                    id = %self.shared.id,
                    opcode = %frame.opcode,
                    request_id = %frame.request_id,
                    capacity = self.capacity,
                    "outbound queue full, dropping frame"
                );
                Err(TransportError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::NotConnected),
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.shared.disconnect(DisconnectReason::LocalClose);
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

/// Pops frames in FIFO order and writes them out.
async fn send_loop(
    shared: Arc<Shared>,
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Frame>,
) {
    let mut stop = shared.stop.subscribe();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let failure = loop {
        let frame = tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break None,
            next = queue.recv() => match next {
                Some(frame) => frame,
                None => break None,
            },
        };

        buf.clear();
        if let Err(e) = frame.encode_into(&mut buf) {
            // Only an unrepresentable body length gets here; the stream
            // itself is still fine.
            tracing::warn!(
                id = %shared.id,
                opcode = %frame.opcode,
                error = %e,
                "dropping unencodable frame"
            );
            continue;
        }
        if let Err(e) = writer.write_all(&buf).await {
            break Some(TransportError::SendFailed(e));
        }
        tracing::trace!(
            id = %shared.id,
            opcode = %frame.opcode,
            request_id = %frame.request_id,
            bytes = buf.len(),
            "frame sent"
        );
    };

    let _ = writer.shutdown().await;
    if let Some(error) = failure {
        shared.disconnect(DisconnectReason::Error(error));
    }
    tracing::debug!(id = %shared.id, "send worker stopped");
}

/// Reads from the socket and forwards every complete frame.
async fn receive_loop(
    shared: Arc<Shared>,
    mut reader: OwnedReadHalf,
    handler: Arc<dyn InboundHandler>,
) {
    let mut stop = shared.stop.subscribe();
    let mut decoder = FrameDecoder::new();

    let reason = loop {
        decoder.buffer_mut().reserve(READ_CHUNK);
        let read = tokio::select! {
            _ = stop.wait_for(|stopped| *stopped) => break None,
            read = reader.read_buf(decoder.buffer_mut()) => read,
        };

        match read {
            Ok(0) => break Some(DisconnectReason::RemoteClosed),
            Ok(n) => tracing::trace!(id = %shared.id, bytes = n, "read"),
            Err(e) => {
                break Some(DisconnectReason::Error(TransportError::ReceiveFailed(e)));
            }
        }

        if let Err(e) = drain_frames(&shared, &mut decoder, handler.as_ref()) {
            break Some(DisconnectReason::Error(TransportError::Framing(e)));
        }
    };

    if let Some(reason) = reason {
        shared.disconnect(reason);
    }
    tracing::debug!(id = %shared.id, "receive worker stopped");
}

/// Hands every complete buffered frame to the handler.
fn drain_frames(
    shared: &Shared,
    decoder: &mut FrameDecoder,
    handler: &dyn InboundHandler,
) -> Result<(), tankwire_protocol::ProtocolError> {
    while let Some(frame) = decoder.try_decode_one()? {
        tracing::trace!(
            id = %shared.id,
            opcode = %frame.opcode,
            request_id = %frame.request_id,
            bytes = frame.body.len(),
            "frame received"
        );
        let opcode = frame.opcode;
        if panic::catch_unwind(AssertUnwindSafe(|| handler.on_frame(frame))).is_err() {
            tracing::error!(id = %shared.id, %opcode, "inbound handler panicked");
        }
    }
    Ok(())
}
