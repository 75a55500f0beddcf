//! Error types for the protocol layer.
//!
//! Two families live here. Framing errors ([`ProtocolError::FrameTooLarge`],
//! [`ProtocolError::ChecksumMismatch`], [`ProtocolError::LengthMismatch`])
//! mean the byte stream can no longer be trusted and the connection must be
//! torn down. Payload errors ([`ProtocolError::Encode`],
//! [`ProtocolError::Decode`], [`ProtocolError::InvalidMessage`]) only affect
//! the single message being processed.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a payload or envelope failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserializing a payload or envelope failed.
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// payload registered under the wrong opcode.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message passed deserialization but is not usable.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A frame body is larger than the decoder accepts (or than the
    /// length field can represent, on encode).
    ///
    /// On the receive side this usually means a corrupted length field.
    #[error("frame body of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// The CRC-32 carried in the header does not match the frame contents.
    #[error("checksum mismatch: header says {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A frame slice does not span exactly header + declared body.
    #[error("frame length mismatch: declared {declared} bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// Not enough bytes to read a fixed-size field.
    #[error("truncated input: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },
}

impl ProtocolError {
    /// Returns `true` for errors after which frame boundaries in the
    /// receive stream can no longer be trusted.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::FrameTooLarge { .. }
                | Self::ChecksumMismatch { .. }
                | Self::LengthMismatch { .. }
                | Self::Truncated { .. }
        )
    }
}
