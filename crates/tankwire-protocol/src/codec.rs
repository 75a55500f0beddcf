//! Payload codecs: how frame bodies become Rust values and back.
//!
//! The frame layer treats bodies as opaque bytes. What's inside them (the
//! [`ResponseEnvelope`](crate::ResponseEnvelope) the server wraps every
//! reply in, and the message-specific payload inside that) is produced and
//! consumed through the [`Codec`] trait, so the body format can change
//! without touching framing or dispatch.
//!
//! [`JsonCodec`] is the default and the only implementation shipped today.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes Rust values into frame bodies and decodes them back.
///
/// `Send + Sync + 'static` because a codec lives inside the dispatcher,
/// which is shared between application tasks and the receive worker.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into body bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes body bytes into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use tankwire_protocol::{Codec, JsonCodec, ResponseEnvelope};
///
/// let codec = JsonCodec;
/// let envelope = ResponseEnvelope::ok(b"{}".to_vec());
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: ResponseEnvelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::ResponseEnvelope;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct LoginResponse {
        player_id: u64,
        nickname: String,
    }

    #[test]
    fn test_json_codec_nested_payload() {
        let codec = JsonCodec;
        let inner = LoginResponse {
            player_id: 9,
            nickname: "tank".into(),
        };
        let envelope = ResponseEnvelope::ok(codec.encode(&inner).unwrap());
        let body = codec.encode(&envelope).unwrap();

        let outer: ResponseEnvelope = codec.decode(&body).unwrap();
        let decoded: LoginResponse = codec.decode(&outer.payload).unwrap();
        assert_eq!(decoded, inner);
    }

    #[test]
    fn test_json_codec_decode_garbage_is_decode_error() {
        let result: Result<LoginResponse, _> = JsonCodec.decode(b"\x00\x01");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
