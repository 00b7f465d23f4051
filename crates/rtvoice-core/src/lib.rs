//! # rtvoice-core
//!
//! Shared vocabulary for the realtime voice session engine.
//!
//! - **Events**: [`events::ServerEvent`] (inbound) and [`events::ClientEvent`] (outbound)
//!   JSON envelopes, plus [`events::Envelope`] for two-phase frame decoding
//! - **Handlers**: [`handler::EventHandler`] (inbound routing seam) and
//!   [`handler::EventSink`] / [`handler::ResponseControl`] (outbound seams
//!   implemented by the transport)
//! - **Errors**: [`errors::TransportError`], [`errors::HandlerError`], log categories
//! - **Metrics**: injectable [`metrics::Counter`] / [`metrics::Gauge`] handles
//! - **Retry**: reconnect [`retry::Backoff`] and bounded [`retry::poll_with_backoff`]
//! - **Logging**: `tracing-subscriber` initialisation (plain or JSON)
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other rtvoice crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod text;

pub use errors::{ErrorCategory, HandlerError, TransportError};
pub use events::{ClientEvent, ConversationItem, Envelope, Role, ServerEvent};
pub use handler::{EventHandler, EventSink, ResponseControl, handler_fn};
