//! Core protocol types that travel in frame headers and bodies.
//!
//! - [`Opcode`]: what kind of message a frame carries.
//! - [`RequestId`]: ties a response frame to the request that caused it.
//! - [`ErrorCode`]: the status code carried by every [`ResponseEnvelope`].
//! - [`ResponseEnvelope`]: the generic wrapper every server body is parsed
//!   into before the message-specific payload is looked at.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Opcode
// ---------------------------------------------------------------------------

/// Identifies the semantic type of a frame.
///
/// On the wire this is a `u16`. Known values get a named variant; anything
/// else round-trips through [`Opcode::Unknown`] so a newer server can't make
/// an older client fail to decode a frame. Use [`Opcode::from_code`] rather
/// than building `Unknown` by hand, so a known code always maps to its named
/// variant.
///
/// Codes 0 to 5 and 255 match the reference game server. Codes 6 to 20
/// (room, lobby and match messages) are this crate's own assignments; check
/// them against the server you talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Error,
    Login,
    Logout,
    Chat,
    Move,
    Attack,
    CreateRoom,
    JoinRoom,
    PageRoom,
    LeaveRoom,
    Ready,
    StartGame,
    LoadedAck,
    PlayerJoinRoom,
    PlayerLeaveRoom,
    PlayerReady,
    GameStarted,
    GameTick,
    TankMove,
    TankShoot,
    LeaveMatch,
    /// A code this build doesn't have a name for.
    Unknown(u16),
}

impl Opcode {
    /// Conventional code for "unknown message type".
    pub const UNKNOWN_CODE: u16 = 255;

    /// Maps a wire code to its opcode.
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Error,
            1 => Self::Login,
            2 => Self::Logout,
            3 => Self::Chat,
            4 => Self::Move,
            5 => Self::Attack,
            6 => Self::CreateRoom,
            7 => Self::JoinRoom,
            8 => Self::PageRoom,
            9 => Self::LeaveRoom,
            10 => Self::Ready,
            11 => Self::StartGame,
            12 => Self::LoadedAck,
            13 => Self::PlayerJoinRoom,
            14 => Self::PlayerLeaveRoom,
            15 => Self::PlayerReady,
            16 => Self::GameStarted,
            17 => Self::GameTick,
            18 => Self::TankMove,
            19 => Self::TankShoot,
            20 => Self::LeaveMatch,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire code.
    pub fn code(self) -> u16 {
        match self {
            Self::Error => 0,
            Self::Login => 1,
            Self::Logout => 2,
            Self::Chat => 3,
            Self::Move => 4,
            Self::Attack => 5,
            Self::CreateRoom => 6,
            Self::JoinRoom => 7,
            Self::PageRoom => 8,
            Self::LeaveRoom => 9,
            Self::Ready => 10,
            Self::StartGame => 11,
            Self::LoadedAck => 12,
            Self::PlayerJoinRoom => 13,
            Self::PlayerLeaveRoom => 14,
            Self::PlayerReady => 15,
            Self::GameStarted => 16,
            Self::GameTick => 17,
            Self::TankMove => 18,
            Self::TankShoot => 19,
            Self::LeaveMatch => 20,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u16> for Opcode {
    fn from(code: u16) -> Self {
        Self::from_code(code)
    }
}

impl From<Opcode> for u16 {
    fn from(opcode: Opcode) -> Self {
        opcode.code()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({code})"),
            known => write!(f, "{known:?}({})", known.code()),
        }
    }
}

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

/// Correlates a response frame with the request that produced it.
///
/// `RequestId(0)` is reserved for uncorrelated traffic: fire-and-forget
/// sends from the client and broadcasts from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u32);

impl RequestId {
    /// The id carried by uncorrelated frames.
    pub const BROADCAST: Self = Self(0);

    /// Returns the raw `u32`.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` if this id refers to a specific request.
    pub fn is_correlated(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Status codes carried in [`ResponseEnvelope::code`].
///
/// Grouped by thousands: `0` is success, `1xxx` common failures, `2xxx`
/// protocol/argument problems, `3xxx` auth, `4xxx` resources, `5xxx`
/// transient conditions a caller may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,

    InternalError,
    UnknownError,
    NotImplemented,

    BadRequest,
    InvalidArgument,
    MissingArgument,
    BadProtocolVersion,
    UnsupportedCommand,
    PayloadTooLarge,

    Unauthorized,
    TokenExpired,
    Forbidden,

    NotFound,
    AlreadyExists,
    Conflict,

    Timeout,
    RateLimited,
    ServiceUnavailable,
}

impl ErrorCode {
    const ALL: [Self; 19] = [
        Self::Ok,
        Self::InternalError,
        Self::UnknownError,
        Self::NotImplemented,
        Self::BadRequest,
        Self::InvalidArgument,
        Self::MissingArgument,
        Self::BadProtocolVersion,
        Self::UnsupportedCommand,
        Self::PayloadTooLarge,
        Self::Unauthorized,
        Self::TokenExpired,
        Self::Forbidden,
        Self::NotFound,
        Self::AlreadyExists,
        Self::Conflict,
        Self::Timeout,
        Self::RateLimited,
        Self::ServiceUnavailable,
    ];

    /// Numeric code as it appears on the wire.
    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::InternalError => 1000,
            Self::UnknownError => 1001,
            Self::NotImplemented => 1002,
            Self::BadRequest => 2000,
            Self::InvalidArgument => 2001,
            Self::MissingArgument => 2002,
            Self::BadProtocolVersion => 2003,
            Self::UnsupportedCommand => 2004,
            Self::PayloadTooLarge => 2005,
            Self::Unauthorized => 3001,
            Self::TokenExpired => 3002,
            Self::Forbidden => 3003,
            Self::NotFound => 4001,
            Self::AlreadyExists => 4002,
            Self::Conflict => 4003,
            Self::Timeout => 5001,
            Self::RateLimited => 5002,
            Self::ServiceUnavailable => 5003,
        }
    }

    /// Default human-readable text for the code.
    pub fn message(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::InternalError => "Internal error",
            Self::UnknownError => "Unknown error",
            Self::NotImplemented => "Not implemented",
            Self::BadRequest => "Bad request",
            Self::InvalidArgument => "Invalid argument",
            Self::MissingArgument => "Missing argument",
            Self::BadProtocolVersion => "Bad protocol version",
            Self::UnsupportedCommand => "Unsupported command",
            Self::PayloadTooLarge => "Payload too large",
            Self::Unauthorized => "Unauthorized",
            Self::TokenExpired => "Token expired",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "Not found",
            Self::AlreadyExists => "Already exists",
            Self::Conflict => "Conflict",
            Self::Timeout => "Timeout",
            Self::RateLimited => "Rate limited",
            Self::ServiceUnavailable => "Service unavailable",
        }
    }

    /// Maps a wire code back to a status. Unrecognised codes become
    /// [`ErrorCode::UnknownError`].
    pub fn from_code(code: i32) -> Self {
        Self::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .unwrap_or(Self::UnknownError)
    }

    /// Returns `true` for [`ErrorCode::Ok`].
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

// ---------------------------------------------------------------------------
// ResponseEnvelope
// ---------------------------------------------------------------------------

/// Generic wrapper around every body the server sends.
///
/// ```text
/// ┌───────────────────────────────┐
/// │ code: 0                       │  ← ErrorCode, 0 = success
/// │ message: ""                   │  ← error text when code != 0
/// │ payload: [..bytes..]          │  ← message-specific, opaque here
/// └───────────────────────────────┘
/// ```
///
/// Only when `code` is `0` is `payload` handed to the parser registered for
/// the frame's opcode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: i32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl ResponseEnvelope {
    /// A successful envelope wrapping `payload`.
    pub fn ok(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            code: ErrorCode::Ok.code(),
            message: String::new(),
            payload: payload.into(),
        }
    }

    /// A failed envelope with no payload.
    pub fn error(status: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: status.code(),
            message: message.into(),
            payload: Vec::new(),
        }
    }

    /// The envelope's status.
    pub fn status(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }
}

// =========================================================================
// Tests
// =========================================================================
