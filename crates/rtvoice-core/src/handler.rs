//! Seams between the transport and the rest of the session.
//!
//! The transport calls an [`EventHandler`] once per inbound event, awaiting
//! it before reading the next frame. Components that need to talk back to the
//! service hold an [`EventSink`] instead of the concrete client.

use std::future::Future;

use async_trait::async_trait;

use crate::errors::{HandlerError, TransportError};
use crate::events::{ClientEvent, ServerEvent};

/// Receives every decoded inbound event, strictly in arrival order.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event. A returned error is classified by the transport:
    /// [`HandlerError::Transport`] reconnects, anything else ends the session.
    async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError>;
}

/// Outbound half of the session.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Serialise and send one event on the current socket.
    async fn send_event(&self, event: &ClientEvent) -> Result<(), TransportError>;
}

/// Response bookkeeping for barge-in, layered on the outbound half.
///
/// The transport owns the active and canceled response IDs; handlers only
/// touch them through this trait.
#[async_trait]
pub trait ResponseControl: EventSink {
    /// The response currently streaming.
    fn active_response(&self) -> Option<String>;
    /// Mark `response_id` as the streaming response.
    fn set_active_response(&self, response_id: &str);
    /// Whether `response_id` was canceled locally.
    fn is_canceled(&self, response_id: &str) -> bool;
    /// A terminal event arrived for `response_id`.
    fn finish_response(&self, response_id: &str);
    /// Cancel the active response (marking it canceled before sending).
    /// Returns the canceled ID, if there was one.
    async fn cancel_active_response(&self) -> Result<Option<String>, TransportError>;
}

/// [`EventHandler`] backed by an async closure.
pub struct FnHandler<F>(F);

/// Build an [`EventHandler`] from a closure taking an owned event.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(ServerEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(ServerEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, event: &ServerEvent) -> Result<(), HandlerError> {
        (self.0)(event.clone()).await
    }
}
