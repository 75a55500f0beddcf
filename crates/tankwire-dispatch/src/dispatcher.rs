//! The dispatcher: outbound requests in, decoded responses out.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tankwire_protocol::{Codec, ErrorCode, Frame, JsonCodec, Opcode, RequestId, ResponseEnvelope};
use tankwire_transport::{DisconnectReason, InboundHandler, OutboundSink};

use crate::pending::{PendingTable, Ticket};
use crate::subscriptions::SubscriptionRegistry;
use crate::{
    DecodedResponse, DispatchError, ParserTable, RequestIdAllocator, Subscriber, SubscriptionHandle,
};

/// Timeout used by callers that don't pick their own.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type DisconnectListener = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;

/// Correlates requests with responses and routes everything else to
/// opcode subscribers.
///
/// Install it as the connection's [`InboundHandler`] and pass the
/// connection back in as the [`OutboundSink`] when sending:
///
/// ```text
/// app ──send_and_await──→ Dispatcher ──enqueue──→ TcpConnection
///  ▲                          ▲                        │
///  └── DecodedResponse ───────┴──────on_frame──────────┘
/// ```
///
/// Inbound routing:
///
/// 1. `request_id > 0` with a pending request: that request's future
///    resolves with the decoded response.
/// 2. Anything else goes to the subscribers of the frame's opcode.
///
/// Bodies are decoded with `C` (JSON unless told otherwise) into a
/// [`ResponseEnvelope`]; a zero status has its payload handed to the
/// parser registered for the opcode.
pub struct Dispatcher<M, C = JsonCodec> {
    ids: RequestIdAllocator,
    pending: PendingTable<M>,
    subscriptions: Arc<SubscriptionRegistry<M>>,
    parsers: ParserTable<M>,
    codec: C,
    protocol_version: u8,
    disconnect_listeners: Mutex<Vec<DisconnectListener>>,
}

impl<M> Dispatcher<M> {
    /// A dispatcher decoding envelopes as JSON.
    pub fn new(parsers: ParserTable<M>) -> Self {
        Self::with_codec(parsers, JsonCodec)
    }
}

impl<M, C: Codec> Dispatcher<M, C> {
    pub fn with_codec(parsers: ParserTable<M>, codec: C) -> Self {
        Self {
            ids: RequestIdAllocator::new(),
            pending: PendingTable::new(),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            parsers,
            codec,
            protocol_version: 1,
            disconnect_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Version byte written into every outbound frame.
    pub fn with_protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_id_allocator(mut self, ids: RequestIdAllocator) -> Self {
        self.ids = ids;
        self
    }

    pub fn protocol_version(&self) -> u8 {
        self.protocol_version
    }

    /// Requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    /// Fire-and-forget: queues a frame with request id `0`.
    pub fn send(
        &self,
        sink: &dyn OutboundSink,
        opcode: Opcode,
        body: impl Into<Bytes>,
    ) -> Result<(), DispatchError> {
        let frame = Frame::new(opcode, self.protocol_version, RequestId::BROADCAST, body);
        sink.enqueue(frame)?;
        tracing::trace!(%opcode, "message queued");
        Ok(())
    }

    /// Sends a correlated request and waits for its response.
    ///
    /// Resolves with whichever happens first: the matching response,
    /// `timeout` elapsing ([`DispatchError::Timeout`]), or the connection
    /// going down ([`DispatchError::Disconnected`]). A failed enqueue
    /// resolves immediately with the transport error. Dropping the future
    /// forgets the request; a late response is then routed as a broadcast.
    pub async fn send_and_await(
        &self,
        sink: &dyn OutboundSink,
        opcode: Opcode,
        body: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<DecodedResponse<M>, DispatchError> {
        let id = self.ids.next_id();
        let (ticket, mut rx) = self.pending.insert(id, opcode);
        let _guard = PendingGuard {
            pending: &self.pending,
            ticket,
        };

        let frame = Frame::new(opcode, self.protocol_version, id, body);
        if let Err(e) = sink.enqueue(frame) {
            self.pending.remove(ticket);
            return Err(e.into());
        }
        tracing::debug!(request_id = %id, %opcode, ?timeout, "request sent");

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(DispatchError::Disconnected)),
            Err(_) if self.pending.remove(ticket) => {
                tracing::warn!(request_id = %id, %opcode, ?timeout, "request timed out");
                Err(DispatchError::Timeout {
                    request_id: id,
                    after: timeout,
                })
            }
            // The response was claimed just as the timer fired; it is
            // already on its way.
            Err(_) => rx.await.unwrap_or(Err(DispatchError::Disconnected)),
        }
    }

    // -----------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------

    /// Subscribes to unsolicited messages with `opcode`. Returns `false`
    /// if this exact subscriber instance is already subscribed.
    pub fn subscribe(&self, opcode: Opcode, subscriber: Arc<dyn Subscriber<M>>) -> bool {
        let added = self.subscriptions.subscribe(opcode, subscriber);
        if added {
            tracing::debug!(%opcode, "subscribed");
        }
        added
    }

    /// Like [`subscribe`](Self::subscribe), but the subscription lasts
    /// only as long as the returned handle. `None` if this exact subscriber
    /// instance is already subscribed.
    pub fn subscribe_scoped(
        &self,
        opcode: Opcode,
        subscriber: Arc<dyn Subscriber<M>>,
    ) -> Option<SubscriptionHandle<M>> {
        if !self.subscribe(opcode, Arc::clone(&subscriber)) {
            return None;
        }
        Some(SubscriptionHandle::new(&self.subscriptions, opcode, subscriber))
    }

    pub fn unsubscribe(&self, opcode: Opcode, subscriber: &Arc<dyn Subscriber<M>>) -> bool {
        let removed = self.subscriptions.unsubscribe(opcode, subscriber);
        if removed {
            tracing::debug!(%opcode, "unsubscribed");
        }
        removed
    }

    pub fn subscriber_count(&self, opcode: Opcode) -> usize {
        self.subscriptions.count(opcode)
    }

    /// Registers a callback for when the connection goes down. It runs
    /// after pending requests have been failed.
    pub fn add_disconnect_listener<F>(&self, listener: F)
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.disconnect_listeners.lock().push(Arc::new(listener));
    }

    // -----------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------

    fn route(&self, frame: Frame) {
        let request_id = frame.request_id;
        if request_id.is_correlated() {
            if let Some(waiter) = self.pending.take(request_id) {
                let response = self.decode(waiter.opcode, request_id, &frame.body);
                tracing::debug!(
                    %request_id,
                    opcode = %waiter.opcode,
                    status = %response.status,
                    "response received"
                );
                if waiter.tx.send(Ok(response)).is_err() {
                    tracing::debug!(%request_id, "requester gone before response");
                }
                return;
            }
            tracing::debug!(
                %request_id,
                opcode = %frame.opcode,
                "no pending request, routing by opcode"
            );
        }
        self.broadcast(frame);
    }

    fn broadcast(&self, frame: Frame) {
        let opcode = frame.opcode;
        if self.subscriptions.count(opcode) == 0 {
            tracing::trace!(%opcode, "no subscribers, dropping message");
            return;
        }
        let message = self.decode(opcode, frame.request_id, &frame.body);
        let delivered = self.subscriptions.publish(opcode, &message);
        tracing::trace!(%opcode, delivered, "broadcast delivered");
    }

    /// Never fails: every problem ends up in `status` / `error_message`
    /// or as a missing payload.
    fn decode(&self, opcode: Opcode, request_id: RequestId, body: &[u8]) -> DecodedResponse<M> {
        let envelope: ResponseEnvelope = match self.codec.decode(body) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%opcode, %request_id, error = %e, "malformed response envelope");
                return DecodedResponse {
                    opcode,
                    request_id,
                    status: ErrorCode::UnknownError,
                    error_message: Some(format!("malformed response: {e}")),
                    payload: None,
                };
            }
        };

        let status = envelope.status();
        if !status.is_ok() {
            let message = if envelope.message.is_empty() {
                status.message().to_owned()
            } else {
                envelope.message
            };
            return DecodedResponse {
                opcode,
                request_id,
                status,
                error_message: Some(message),
                payload: None,
            };
        }

        let payload = match self.parsers.parse(opcode, &envelope.payload) {
            Some(Ok(message)) => Some(message),
            Some(Err(e)) => {
                tracing::warn!(%opcode, %request_id, error = %e, "payload parse failed");
                None
            }
            None => {
                tracing::debug!(%opcode, "no parser registered");
                None
            }
        };
        DecodedResponse {
            opcode,
            request_id,
            status,
            error_message: None,
            payload,
        }
    }

    fn fail_pending(&self) {
        let failed = self.pending.drain();
        if failed.is_empty() {
            return;
        }
        tracing::info!(count = failed.len(), "failing pending requests");
        for (_, waiter) in failed {
            let _ = waiter.tx.send(Err(DispatchError::Disconnected));
        }
    }
}

impl<M, C> InboundHandler for Dispatcher<M, C>
where
    M: Send + 'static,
    C: Codec + Send + Sync + 'static,
{
    fn on_frame(&self, frame: Frame) {
        self.route(frame);
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        self.fail_pending();
        let listeners = self.disconnect_listeners.lock().clone();
        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(reason))).is_err() {
                tracing::error!("disconnect listener panicked");
            }
        }
    }
}

/// Forgets the request if the awaiting future is dropped.
struct PendingGuard<'a, M> {
    pending: &'a PendingTable<M>,
    ticket: Ticket,
}

impl<M> Drop for PendingGuard<'_, M> {
    fn drop(&mut self) {
        if self.pending.remove(self.ticket) {
            tracing::debug!(request_id = %self.ticket.id, "request abandoned");
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::{Deserialize, Serialize};
    use tankwire_transport::TransportError;

    use super::*;
    use crate::SubscriberError;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Joined {
        room_id: u32,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Msg {
        Joined(Joined),
    }

    #[derive(Default)]
    struct CapturingSink {
        frames: Mutex<Vec<Frame>>,
    }

    impl OutboundSink for CapturingSink {
        fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
            self.frames.lock().push(frame);
            Ok(())
        }
    }

    fn dispatcher() -> Dispatcher<Msg> {
        Dispatcher::new(ParserTable::new().register_json(Opcode::PlayerJoinRoom, Msg::Joined))
    }

    fn body(envelope: &ResponseEnvelope) -> Vec<u8> {
        JsonCodec.encode(envelope).unwrap()
    }

    fn joined(room_id: u32) -> Vec<u8> {
        body(&ResponseEnvelope::ok(
            JsonCodec.encode(&Joined { room_id }).unwrap(),
        ))
    }

    // =====================================================================
    // Decoding
    // =====================================================================

    #[test]
    fn test_decode_ok_envelope_parses_payload() {
        let d = dispatcher();
        let response = d.decode(Opcode::PlayerJoinRoom, RequestId(3), &joined(12));

        assert_eq!(response.status, ErrorCode::Ok);
        assert_eq!(response.error_message, None);
        assert_eq!(response.payload, Some(Msg::Joined(Joined { room_id: 12 })));
        assert_eq!(response.request_id, RequestId(3));
    }

    #[test]
    fn test_decode_error_status_keeps_server_message() {
        let d = dispatcher();
        let raw = body(&ResponseEnvelope::error(ErrorCode::NotFound, "room 9 is gone"));

        let response = d.decode(Opcode::PlayerJoinRoom, RequestId(1), &raw);

        assert_eq!(response.status, ErrorCode::NotFound);
        assert_eq!(response.error_message.as_deref(), Some("room 9 is gone"));
        assert_eq!(response.payload, None);
    }

    #[test]
    fn test_decode_error_status_without_message_uses_default_text() {
        let d = dispatcher();
        let raw = body(&ResponseEnvelope::error(ErrorCode::Forbidden, ""));

        let response = d.decode(Opcode::PlayerJoinRoom, RequestId(1), &raw);

        assert_eq!(response.error_message.as_deref(), Some("Forbidden"));
    }

    #[test]
    fn test_decode_bad_payload_yields_no_payload() {
        let d = dispatcher();
        let raw = body(&ResponseEnvelope::ok(b"{\"room_id\":\"nope\"}".to_vec()));

        let response = d.decode(Opcode::PlayerJoinRoom, RequestId(1), &raw);

        assert!(response.is_ok());
        assert_eq!(response.payload, None);
    }

    #[test]
    fn test_decode_without_parser_yields_no_payload() {
        let d = dispatcher();
        let response = d.decode(Opcode::GameTick, RequestId::BROADCAST, &joined(1));

        assert!(response.is_ok());
        assert_eq!(response.payload, None);
    }

    #[test]
    fn test_decode_malformed_envelope_is_unknown_error() {
        let d = dispatcher();
        let response = d.decode(Opcode::PlayerJoinRoom, RequestId(1), b"\x00\x01garbage");

        assert_eq!(response.status, ErrorCode::UnknownError);
        assert!(response.error_message.is_some());
        assert_eq!(response.payload, None);
    }

    // =====================================================================
    // Routing
    // =====================================================================

    #[test]
    fn test_send_uses_broadcast_id_and_protocol_version() {
        let d = dispatcher().with_protocol_version(3);
        let sink = CapturingSink::default();

        d.send(&sink, Opcode::Chat, b"{}".to_vec()).unwrap();

        let frames = sink.frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].request_id, RequestId::BROADCAST);
        assert_eq!(frames[0].version, 3);
        assert_eq!(frames[0].opcode, Opcode::Chat);
    }

    #[test]
    fn test_broadcast_reaches_subscribers_of_its_opcode_only() {
        let d = dispatcher();
        let joins = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::new(AtomicUsize::new(0));
        {
            let joins = Arc::clone(&joins);
            d.subscribe(
                Opcode::PlayerJoinRoom,
                Arc::new(move |m: &DecodedResponse<Msg>| -> Result<(), SubscriberError> {
                    assert_eq!(m.payload, Some(Msg::Joined(Joined { room_id: 4 })));
                    joins.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
            let ticks = Arc::clone(&ticks);
            d.subscribe(
                Opcode::GameTick,
                Arc::new(move |_: &DecodedResponse<Msg>| -> Result<(), SubscriberError> {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            );
        }

        d.on_frame(Frame::new(Opcode::PlayerJoinRoom, 1, RequestId::BROADCAST, joined(4)));

        assert_eq!(joins.load(Ordering::SeqCst), 1);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unmatched_request_id_falls_through_to_subscribers() {
        let d = dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        d.subscribe(
            Opcode::PlayerJoinRoom,
            Arc::new(move |m: &DecodedResponse<Msg>| -> Result<(), SubscriberError> {
                assert_eq!(m.request_id, RequestId(999));
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        d.on_frame(Frame::new(Opcode::PlayerJoinRoom, 1, RequestId(999), joined(1)));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_subscription_ends_with_its_handle() {
        let d = dispatcher();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let subscriber: Arc<dyn Subscriber<Msg>> =
            Arc::new(move |_: &DecodedResponse<Msg>| -> Result<(), SubscriberError> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        let handle = d
            .subscribe_scoped(Opcode::PlayerJoinRoom, Arc::clone(&subscriber))
            .expect("first subscription");
        assert!(d.subscribe_scoped(Opcode::PlayerJoinRoom, Arc::clone(&subscriber)).is_none());
        d.on_frame(Frame::new(Opcode::PlayerJoinRoom, 1, RequestId::BROADCAST, joined(2)));

        drop(handle);
        d.on_frame(Frame::new(Opcode::PlayerJoinRoom, 1, RequestId::BROADCAST, joined(3)));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(d.subscriber_count(Opcode::PlayerJoinRoom), 0);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_dropped() {
        let d = dispatcher();
        // Nothing to observe but the absence of a panic.
        d.on_frame(Frame::new(
            Opcode::GameTick,
            1,
            RequestId::BROADCAST,
            b"not even json".to_vec(),
        ));
        assert_eq!(d.pending_count(), 0);
    }

    #[test]
    fn test_disconnect_listeners_run_and_panics_are_contained() {
        let d = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        d.add_disconnect_listener(|_| panic!("listener bug"));
        let seen = Arc::clone(&calls);
        d.add_disconnect_listener(move |reason| {
            assert!(matches!(reason, DisconnectReason::RemoteClosed));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        d.on_disconnect(&DisconnectReason::RemoteClosed);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
