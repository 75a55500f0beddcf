use tankwire_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the TCP connection failed or timed out.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing to the socket failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading from the socket failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The inbound byte stream violated the framing rules.
    #[error("framing error: {0}")]
    Framing(#[from] ProtocolError),

    /// The outbound queue had no room; the frame was dropped.
    #[error("outbound queue full ({capacity} frames), message dropped")]
    QueueFull { capacity: usize },

    /// The connection is not in the `Connected` state.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on an instance that was already used.
    #[error("connection already started; create a new instance to reconnect")]
    AlreadyStarted,
}
