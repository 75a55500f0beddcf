//! `GameClient`: one connection, one dispatcher, one handle.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tankwire_dispatch::{DecodedResponse, Dispatcher, ParserTable, Subscriber, SubscriptionHandle};
use tankwire_protocol::{Codec, JsonCodec, Opcode};
use tankwire_transport::{ConnectionState, DisconnectReason, InboundHandler, TcpConnection};

use crate::{ClientConfig, TankwireError};

/// A connected game client.
///
/// `M` is the application's message type; `parsers` says how to build one
/// from each opcode's payload.
///
/// ```rust,no_run
/// use serde::{Deserialize, Serialize};
/// use tankwire::prelude::*;
///
/// #[derive(Serialize)]
/// struct Login<'a> { user: &'a str, password: &'a str }
///
/// #[derive(Debug, Deserialize)]
/// struct LoginResponse { player_id: u64 }
///
/// #[derive(Debug)]
/// enum GameMessage { Login(LoginResponse) }
///
/// # async fn run() -> Result<(), TankwireError> {
/// let parsers = ParserTable::new().register_json(Opcode::Login, GameMessage::Login);
/// let client = GameClient::connect(ClientConfig::default(), parsers).await?;
///
/// let response = client
///     .request(Opcode::Login, &Login { user: "ana", password: "hunter2" })
///     .await?;
/// println!("{:?}", response.payload);
/// # Ok(())
/// # }
/// ```
///
/// Dropping the client closes the connection.
pub struct GameClient<M> {
    config: ClientConfig,
    connection: TcpConnection,
    dispatcher: Arc<Dispatcher<M>>,
}

impl<M: Send + 'static> GameClient<M> {
    /// Opens the connection described by `config`.
    pub async fn connect(
        config: ClientConfig,
        parsers: ParserTable<M>,
    ) -> Result<Self, TankwireError> {
        let dispatcher = Arc::new(
            Dispatcher::new(parsers).with_protocol_version(config.protocol_version),
        );
        let connection = TcpConnection::new(config.addr(), config.outbound_capacity)
            .with_connect_timeout(config.connect_timeout);

        let handler: Arc<dyn InboundHandler> = Arc::clone(&dispatcher) as _;
        connection.connect(handler).await?;

        Ok(Self {
            config,
            connection,
            dispatcher,
        })
    }

    /// Fire-and-forget with a raw body.
    pub fn send(&self, opcode: Opcode, body: impl Into<Bytes>) -> Result<(), TankwireError> {
        self.dispatcher.send(&self.connection, opcode, body)?;
        Ok(())
    }

    /// Fire-and-forget with a JSON body.
    pub fn send_message<T: Serialize>(
        &self,
        opcode: Opcode,
        message: &T,
    ) -> Result<(), TankwireError> {
        let body = JsonCodec.encode(message)?;
        self.send(opcode, body)
    }

    /// Sends a raw request and waits up to the configured request timeout.
    pub async fn send_and_await(
        &self,
        opcode: Opcode,
        body: impl Into<Bytes>,
    ) -> Result<DecodedResponse<M>, TankwireError> {
        self.send_and_await_with_timeout(opcode, body, self.config.request_timeout)
            .await
    }

    pub async fn send_and_await_with_timeout(
        &self,
        opcode: Opcode,
        body: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<DecodedResponse<M>, TankwireError> {
        let response = self
            .dispatcher
            .send_and_await(&self.connection, opcode, body, timeout)
            .await?;
        Ok(response)
    }

    /// Sends `message` as JSON and waits for the response.
    pub async fn request<T: Serialize>(
        &self,
        opcode: Opcode,
        message: &T,
    ) -> Result<DecodedResponse<M>, TankwireError> {
        let body = JsonCodec.encode(message)?;
        self.send_and_await(opcode, body).await
    }

    /// See [`Dispatcher::subscribe`].
    pub fn subscribe(&self, opcode: Opcode, subscriber: Arc<dyn Subscriber<M>>) -> bool {
        self.dispatcher.subscribe(opcode, subscriber)
    }

    /// See [`Dispatcher::subscribe_scoped`].
    pub fn subscribe_scoped(
        &self,
        opcode: Opcode,
        subscriber: Arc<dyn Subscriber<M>>,
    ) -> Option<SubscriptionHandle<M>> {
        self.dispatcher.subscribe_scoped(opcode, subscriber)
    }

    pub fn unsubscribe(&self, opcode: Opcode, subscriber: &Arc<dyn Subscriber<M>>) -> bool {
        self.dispatcher.unsubscribe(opcode, subscriber)
    }

    /// Runs `callback` once when the connection goes down, for any reason
    /// including [`close`](Self::close).
    pub fn on_disconnect<F>(&self, callback: F)
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.dispatcher.add_disconnect_listener(callback);
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.dispatcher.pending_count()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Closes the connection. Pending requests fail with
    /// [`DispatchError::Disconnected`](tankwire_dispatch::DispatchError::Disconnected).
    pub fn close(&self) {
        self.connection.close();
    }
}
