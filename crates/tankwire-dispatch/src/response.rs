use tankwire_protocol::{ErrorCode, Opcode, RequestId};

/// A server frame after envelope and payload decoding.
///
/// Exactly one of these is produced per routed frame. `payload` is only
/// ever `Some` when `status` is [`ErrorCode::Ok`] and a parser for the
/// opcode succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedResponse<M> {
    /// For correlated responses, the opcode of the request.
    pub opcode: Opcode,
    pub request_id: RequestId,
    pub status: ErrorCode,
    /// Server text for a failed status, or the decode failure.
    pub error_message: Option<String>,
    pub payload: Option<M>,
}

impl<M> DecodedResponse<M> {
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Consumes the response and returns the payload, if any.
    pub fn into_payload(self) -> Option<M> {
        self.payload
    }
}
