//! Error types for the dispatch layer.

use std::fmt;
use std::time::Duration;

use tankwire_protocol::RequestId;
use tankwire_transport::TransportError;

/// Why a request did not produce a response.
///
/// A response that *arrived* but carries a non-zero status is not an error
/// here; it comes back as a [`DecodedResponse`](crate::DecodedResponse)
/// with `status` set.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No response arrived within the request's timeout.
    #[error("request {request_id} timed out after {after:?}")]
    Timeout { request_id: RequestId, after: Duration },

    /// The connection went down while the request was pending.
    #[error("connection lost before a response arrived")]
    Disconnected,

    /// The request could not be queued for sending.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Returns `true` for [`DispatchError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failure reported by a [`Subscriber`](crate::Subscriber).
///
/// It is logged and otherwise ignored; other subscribers still run.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SubscriberError(String);

impl SubscriberError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl From<&str> for SubscriberError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<String> for SubscriberError {
    fn from(message: String) -> Self {
        Self(message)
    }
}
