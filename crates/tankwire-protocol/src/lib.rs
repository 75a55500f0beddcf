//! Wire protocol for Tankwire.
//!
//! This crate defines what travels between the game client and server:
//!
//! - **Framing** ([`Frame`], [`FrameDecoder`]): the 15-byte big-endian
//!   header, CRC-32 integrity check, and incremental decoding of a TCP
//!   byte stream into frames.
//! - **Types** ([`Opcode`], [`RequestId`], [`ErrorCode`],
//!   [`ResponseEnvelope`]): what the header fields and the generic body
//!   wrapper mean.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how bodies map to Rust
//!   values.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (socket bytes) → Protocol (Frame) → Dispatch (typed responses)
//! ```
//!
//! Nothing here does I/O. The transport crate owns the socket and feeds
//! bytes into a [`FrameDecoder`].

mod codec;
pub mod endian;
mod error;
pub mod frame;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{Frame, FrameDecoder, HEADER_LEN, MAX_BODY_LEN};
pub use types::{ErrorCode, Opcode, RequestId, ResponseEnvelope};
