//! Transport layer for Tankwire.
//!
//! Owns the TCP socket to the game server. A connected [`TcpConnection`]
//! runs exactly two tokio tasks:
//!
//! - the **send worker** pops frames off a bounded outbound queue, encodes
//!   them and writes them to the socket, in enqueue order;
//! - the **receive worker** reads whatever bytes are available, feeds them
//!   to a [`FrameDecoder`](tankwire_protocol::FrameDecoder), and hands every
//!   complete frame to an [`InboundHandler`].
//!
//! Any I/O or framing failure on either side tears the whole connection
//! down and is reported once through [`InboundHandler::on_disconnect`].
//!
//! The two traits here are the seams to the layer above: the dispatcher
//! implements [`InboundHandler`] and talks to the socket only through
//! [`OutboundSink`].

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::TcpConnection;

use std::fmt;

use tankwire_protocol::Frame;

/// Opaque identifier for a connection instance, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle of a connection instance.
///
/// ```text
/// Disconnected ──connect()──→ Connecting ──→ Connected ──→ Disconnected
/// ```
///
/// The final `Disconnected` is terminal. Reconnecting means building a new
/// [`TcpConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// Why a connection went down.
#[derive(Debug)]
pub enum DisconnectReason {
    /// [`TcpConnection::close`] was called, or the connection was dropped.
    LocalClose,
    /// The server closed its end (read returned EOF).
    RemoteClosed,
    /// An I/O or framing error on one of the workers.
    Error(TransportError),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalClose => f.write_str("closed locally"),
            Self::RemoteClosed => f.write_str("closed by server"),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

/// Receives everything the receive worker produces.
///
/// Both methods run on the receive worker task (or, for a local close, on
/// the caller's task) and must not block.
pub trait InboundHandler: Send + Sync + 'static {
    /// Called once per decoded frame, in wire order.
    fn on_frame(&self, frame: Frame);

    /// Called exactly once when a connected instance goes down.
    fn on_disconnect(&self, reason: &DisconnectReason) {
        let _ = reason;
    }
}

/// Something outbound frames can be queued on without blocking.
pub trait OutboundSink: Send + Sync {
    /// Queues `frame` for sending.
    ///
    /// # Errors
    /// `QueueFull` if the outbound queue has no room (the frame is dropped),
    /// `NotConnected` if there is no live connection.
    fn enqueue(&self, frame: Frame) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
        assert_eq!(id.into_inner(), 7);
    }

    #[test]
    fn test_state_u8_round_trip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ] {
            assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::RemoteClosed.to_string(), "closed by server");
        let reason = DisconnectReason::Error(TransportError::NotConnected);
        assert_eq!(reason.to_string(), "not connected");
    }
}
