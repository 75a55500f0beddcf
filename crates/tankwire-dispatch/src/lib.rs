//! Request/response correlation and broadcast routing for Tankwire.
//!
//! Everything the server sends arrives on one socket. This crate decides
//! where each frame goes:
//!
//! 1. **Responses**: a frame whose request id matches a request sent with
//!    [`Dispatcher::send_and_await`] completes that request's future.
//! 2. **Broadcasts**: every other frame is decoded and handed to the
//!    [`Subscriber`]s of its opcode.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client facade (above)  ← typed send / request / subscribe
//!     ↕
//! Dispatch Layer (this crate)  ← request ids, pending table, subscriptions
//!     ↕
//! Transport Layer (below)  ← InboundHandler / OutboundSink
//! ```

mod dispatcher;
mod error;
mod ids;
mod parser;
mod pending;
mod response;
mod subscriptions;

pub use dispatcher::{DEFAULT_REQUEST_TIMEOUT, Dispatcher};
pub use error::{DispatchError, SubscriberError};
pub use ids::{RESERVED_GAP, RequestIdAllocator, SAFE_MAX};
pub use parser::{ParseFn, ParserTable};
pub use response::DecodedResponse;
pub use subscriptions::{Subscriber, SubscriptionHandle};
