//! # Tankwire
//!
//! Async TCP client for the tank battle game protocol.
//!
//! A [`GameClient`] owns one connection to the game server and gives the
//! application three ways to talk to it:
//!
//! - [`send`](GameClient::send): fire-and-forget;
//! - [`request`](GameClient::request) / [`send_and_await`](GameClient::send_and_await):
//!   wait for the response to one specific request;
//! - [`subscribe`](GameClient::subscribe): be told about every server push
//!   with a given opcode (room updates, game ticks, ...).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tankwire::prelude::*;
//!
//! # #[derive(Debug)] enum GameMessage {}
//! # async fn run() -> Result<(), TankwireError> {
//! let config = ClientConfig::load("application.properties")?;
//! let client: GameClient<GameMessage> =
//!     GameClient::connect(config, ParserTable::new()).await?;
//! client.send(Opcode::Ready, b"{}".to_vec())?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::GameClient;
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError};
pub use error::TankwireError;

pub use tankwire_dispatch as dispatch;
pub use tankwire_protocol as protocol;
pub use tankwire_transport as transport;

/// Everything a typical application needs.
pub mod prelude {
    pub use crate::{ClientConfig, ConfigError, GameClient, TankwireError};
    pub use tankwire_dispatch::{
        DecodedResponse, DispatchError, ParserTable, Subscriber, SubscriberError,
        SubscriptionHandle,
    };
    pub use tankwire_protocol::{ErrorCode, Opcode, RequestId};
    pub use tankwire_transport::{ConnectionState, DisconnectReason};
}
