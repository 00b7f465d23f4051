//! # rtvoice-transport
//!
//! WebSocket client for the realtime speech service.
//!
//! - [`RealtimeClient`] owns the socket lifecycle: connect, session handshake,
//!   reconnect with jittered backoff, the bounded outbound audio queue,
//!   keepalive, and response-cancellation bookkeeping for barge-in
//! - [`Endpoint`] builds the `OpenAI` or Azure URL and upgrade headers
//!
//! ## Crate Position
//!
//! Depends on `rtvoice-core` (events, errors, backoff) and `rtvoice-settings`.
//! Driven by `rtvoice-runtime`, which supplies the [`EventHandler`] and uses
//! the client as its [`EventSink`].
//!
//! [`EventHandler`]: rtvoice_core::EventHandler
//! [`EventSink`]: rtvoice_core::EventSink

#![deny(unsafe_code)]

pub mod client;
pub mod endpoint;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use client::{ClientConfig, ClientError, ConnectionState, RealtimeClient};
pub use endpoint::Endpoint;
