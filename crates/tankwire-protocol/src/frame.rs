//! Binary frame encoding and incremental decoding.
//!
//! Every message on the stream is one frame:
//!
//! ```text
//!  0        2   3            7            11           15
//!  ┌────────┬───┬────────────┬────────────┬────────────┬──────────────┐
//!  │ opcode │ v │ request_id │  body_len  │   crc32    │ body ...     │
//!  │  u16   │u8 │    u32     │    u32     │    u32     │ body_len B   │
//!  └────────┴───┴────────────┴────────────┴────────────┴──────────────┘
//! ```
//!
//! All integers are big-endian. The CRC-32 (IEEE) covers bytes `0..11` of
//! the header followed by the body, so the checksum field itself is the only
//! part of the frame it doesn't protect.
//!
//! TCP delivers a byte stream, not frames. A single read may contain half a
//! frame, exactly one, or several back to back. [`FrameDecoder`] keeps the
//! leftovers between reads and hands out complete frames one at a time.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{endian, Opcode, ProtocolError, RequestId};

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 15;

pub const OPCODE_OFFSET: usize = 0;
pub const VERSION_OFFSET: usize = 2;
pub const REQUEST_ID_OFFSET: usize = 3;
pub const BODY_LEN_OFFSET: usize = 7;
pub const CHECKSUM_OFFSET: usize = 11;

/// Largest body the decoder accepts by default (10 MB).
///
/// Anything bigger is treated as a corrupted length field rather than a real
/// message, so a flipped high bit can't make the client buffer gigabytes.
pub const MAX_BODY_LEN: u32 = 10_000_000;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One unit of wire transfer, in either direction.
///
/// Outbound frames are built by the dispatcher and consumed once by the
/// send worker; inbound frames are produced by [`FrameDecoder`] and consumed
/// once by the dispatcher. Neither side keeps them afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: Opcode,
    /// Protocol version. Carried but not interpreted.
    pub version: u8,
    pub request_id: RequestId,
    pub body: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, version: u8, request_id: RequestId, body: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            version,
            request_id,
            body: body.into(),
        }
    }

    /// Total size of this frame on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.body.len()
    }

    /// Encodes the frame into a fresh buffer.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Appends the encoded frame to `dst`.
    ///
    /// The header is written with a zero checksum, the body is appended, and
    /// then the CRC is computed over the finished bytes and patched in.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let body_len = u32::try_from(self.body.len()).map_err(|_| {
            ProtocolError::FrameTooLarge {
                len: self.body.len(),
                max: u32::MAX as usize,
            }
        })?;

        let start = dst.len();
        dst.reserve(self.encoded_len());
        dst.put_u16(self.opcode.code());
        dst.put_u8(self.version);
        dst.put_u32(self.request_id.get());
        dst.put_u32(body_len);
        dst.put_u32(0); // checksum placeholder
        dst.put_slice(&self.body);

        let frame = &mut dst[start..];
        let crc = checksum(&frame[..CHECKSUM_OFFSET], &frame[HEADER_LEN..]);
        endian::write_u32(frame, CHECKSUM_OFFSET, crc).ok_or(
            ProtocolError::Truncated {
                needed: HEADER_LEN,
                available: frame.len(),
            },
        )
    }
}

/// Free-function form of [`Frame::encode`].
pub fn encode(
    opcode: Opcode,
    version: u8,
    request_id: RequestId,
    body: &[u8],
) -> Result<Bytes, ProtocolError> {
    Frame::new(opcode, version, request_id, Bytes::copy_from_slice(body)).encode()
}

/// CRC-32 over the checksummed header prefix followed by the body.
pub fn checksum(header_prefix: &[u8], body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_prefix);
    hasher.update(body);
    hasher.finalize()
}

/// Checks that `frame` is exactly one well-formed frame.
///
/// The slice length must equal header + declared body length, and the
/// stored checksum must match the contents.
pub fn verify(frame: &[u8]) -> Result<(), ProtocolError> {
    let truncated = || ProtocolError::Truncated {
        needed: HEADER_LEN,
        available: frame.len(),
    };
    if frame.len() < HEADER_LEN {
        return Err(truncated());
    }
    let body_len = endian::read_u32(frame, BODY_LEN_OFFSET).ok_or_else(truncated)? as usize;
    let declared = HEADER_LEN + body_len;
    if frame.len() != declared {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: frame.len(),
        });
    }

    let expected = endian::read_u32(frame, CHECKSUM_OFFSET).ok_or_else(truncated)?;
    let actual = checksum(&frame[..CHECKSUM_OFFSET], &frame[HEADER_LEN..]);
    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Incremental decoder over a growing receive buffer.
///
/// Append bytes with [`extend`](Self::extend) (or read straight into
/// [`buffer_mut`](Self::buffer_mut)), then call
/// [`try_decode_one`](Self::try_decode_one) until it returns `Ok(None)`.
/// Any `Err` is fatal: once a length or checksum is wrong there's no way to
/// find the next frame boundary, so the connection has to go.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_body_len: u32,
}

impl FrameDecoder {
    /// Initial buffer capacity; grows on demand.
    const INITIAL_CAPACITY: usize = 4096;

    pub fn new() -> Self {
        Self::with_max_body_len(MAX_BODY_LEN)
    }

    /// Creates a decoder that rejects bodies larger than `max_body_len`.
    pub fn with_max_body_len(max_body_len: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(Self::INITIAL_CAPACITY),
            max_body_len,
        }
    }

    /// Appends received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Direct access to the receive buffer, for `AsyncReadExt::read_buf`.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of bytes waiting to be decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Tries to take one complete frame off the front of the buffer.
    ///
    /// - `Ok(None)`: not enough bytes yet (short header or half packet).
    /// - `Ok(Some(frame))`: one frame removed; any bytes after it stay
    ///   buffered for the next call.
    /// - `Err(_)`: oversized length or checksum mismatch. Fatal.
    pub fn try_decode_one(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }
        let Some(body_len) = endian::read_u32(&self.buffer, BODY_LEN_OFFSET) else {
            return Ok(None);
        };
        if body_len > self.max_body_len {
            return Err(ProtocolError::FrameTooLarge {
                len: body_len as usize,
                max: self.max_body_len as usize,
            });
        }

        let frame_len = HEADER_LEN + body_len as usize;
        if self.buffer.len() < frame_len {
            // Half packet. Make room for the rest so the next read lands
            // in one allocation.
            self.buffer.reserve(frame_len - self.buffer.len());
            return Ok(None);
        }

        verify(&self.buffer[..frame_len])?;

        let mut raw = self.buffer.split_to(frame_len);
        let opcode = Opcode::from_code(raw.get_u16());
        let version = raw.get_u8();
        let request_id = RequestId(raw.get_u32());
        raw.advance(8); // body_len + checksum
        Ok(Some(Frame {
            opcode,
            version,
            request_id,
            body: raw.freeze(),
        }))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
