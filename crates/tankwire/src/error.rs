//! Unified error type for the Tankwire client.

use tankwire_dispatch::DispatchError;
use tankwire_protocol::ProtocolError;
use tankwire_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tankwire` crate directly you deal with this single
/// error type; `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum TankwireError {
    /// Connecting, or queueing a frame, failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A request body could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request got no response (timeout, disconnect).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TankwireError {
    /// Returns `true` if a request timed out waiting for its response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Dispatch(e) if e.is_timeout())
    }
}
