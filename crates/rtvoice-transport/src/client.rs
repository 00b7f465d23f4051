//! Realtime WebSocket session client.
//!
//! [`RealtimeClient::connect`] keeps one logical session alive across socket
//! drops. Per socket it runs three duties concurrently on the calling task:
//!
//! - **inbound**: a reader drains the socket (pongs, pings, close) and
//!   forwards data frames through a small backlog; the dispatcher decodes
//!   each one and awaits the handler before taking the next
//! - **audio**: drain the bounded microphone queue as `input_audio_buffer.append`
//! - **keepalive**: ping every `ping_interval`, fail if the ping cannot be
//!   written or no pong arrives within `ping_timeout`
//!
//! The reader keeps running while a handler is busy, so a slow handler does
//! not starve the keepalive. Every write gives up when the client stops, and
//! the closing handshake is bounded by [`CLOSE_GRACE`].
//!
//! The first duty to finish decides the outcome. A stop request wins over all
//! of them. Socket-level failures reconnect with jittered exponential backoff;
//! handler failures end `connect` with [`ClientError::Handler`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rtvoice_core::events::{ClientEvent, ServerEvent, decode_frame};
use rtvoice_core::metrics::SessionMetrics;
use rtvoice_core::retry::Backoff;
use rtvoice_core::{
    ErrorCategory, EventHandler, EventSink, HandlerError, ResponseControl, TransportError,
};
use rtvoice_settings::TransportSettings;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::error::{CapacityError, Error as WsError};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;

/// Longest wait for the closing handshake on a stop.
pub const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Data frames read ahead of the dispatcher.
const INBOUND_BACKLOG: usize = 16;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Returned by [`RealtimeClient::connect`]. Transport failures never escape.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// An event handler failed with a non-transport error.
    #[error("event handler failed: {0}")]
    Handler(#[source] HandlerError),
}

/// Socket lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket.
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, sending the session configuration.
    Handshaking,
    /// Duties running.
    Streaming,
    /// Stop requested.
    Closing,
}

/// Client tuning.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// First reconnect delay (before jitter).
    pub backoff_base: Duration,
    /// Reconnect delay ceiling.
    pub backoff_max: Duration,
    /// Keepalive ping interval; `None` disables keepalive.
    pub ping_interval: Option<Duration>,
    /// How long to wait for a pong.
    pub ping_timeout: Duration,
    /// Outbound audio queue capacity in chunks.
    pub audio_queue_capacity: usize,
    /// Largest inbound frame accepted.
    pub max_frame_bytes: usize,
    /// `session.update` payload sent after every (re)connect.
    pub session: Option<Value>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_settings(&TransportSettings::default())
    }
}

impl ClientConfig {
    /// Config from the transport settings section.
    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self {
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
            ping_interval: (settings.ping_interval_ms > 0)
                .then(|| Duration::from_millis(settings.ping_interval_ms)),
            ping_timeout: Duration::from_millis(settings.ping_timeout_ms),
            audio_queue_capacity: settings.audio_queue_capacity.max(1),
            max_frame_bytes: settings.max_frame_bytes,
            session: None,
        }
    }

    /// Session configuration to send on every connect.
    #[must_use]
    pub fn with_session(mut self, session: Value) -> Self {
        self.session = Some(session);
        self
    }
}

#[derive(Debug, Default)]
struct ResponseState {
    active: Option<String>,
    canceled: HashSet<String>,
}

/// How a socket's duties ended.
enum Failure {
    Transport(TransportError),
    Handler(HandlerError),
}

impl From<HandlerError> for Failure {
    fn from(e: HandlerError) -> Self {
        match e {
            HandlerError::Transport(t) => Self::Transport(t),
            other => Self::Handler(other),
        }
    }
}

/// One logical realtime session.
pub struct RealtimeClient {
    endpoint: Endpoint,
    config: ClientConfig,
    stop: CancellationToken,
    state: Mutex<ConnectionState>,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    audio_tx: mpsc::Sender<Vec<u8>>,
    audio_rx: tokio::sync::Mutex<mpsc::Receiver<Vec<u8>>>,
    responses: Mutex<ResponseState>,
    pong: Notify,
    inbound_pending: AtomicUsize,
    metrics: SessionMetrics,
}

impl RealtimeClient {
    /// New client; nothing is opened until [`connect`](Self::connect).
    pub fn new(endpoint: Endpoint, config: ClientConfig, metrics: SessionMetrics) -> Self {
        let (audio_tx, audio_rx) = mpsc::channel(config.audio_queue_capacity.max(1));
        Self {
            endpoint,
            config,
            stop: CancellationToken::new(),
            state: Mutex::new(ConnectionState::Disconnected),
            writer: tokio::sync::Mutex::new(None),
            audio_tx,
            audio_rx: tokio::sync::Mutex::new(audio_rx),
            responses: Mutex::new(ResponseState::default()),
            pong: Notify::new(),
            inbound_pending: AtomicUsize::new(0),
            metrics,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = std::mem::replace(&mut *self.state.lock(), next);
        if prev != next {
            tracing::debug!(from = ?prev, to = ?next, "connection state");
        }
    }

    /// Shared counters.
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Token cancelled when the client stops. Background work tied to the
    /// session should select on it.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.child_token()
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    /// Connect and keep the session alive until [`close`](Self::close).
    ///
    /// Returns `Ok(())` after a stop, or the first non-transport handler error.
    pub async fn connect(&self, handler: &dyn EventHandler) -> Result<(), ClientError> {
        let mut backoff = Backoff::new(self.config.backoff_base, self.config.backoff_max);
        let mut connected_once = false;

        while !self.stop.is_cancelled() {
            self.set_state(ConnectionState::Connecting);
            let opened = tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                result = self.open() => result,
            };

            match opened {
                Ok(ws) => {
                    if connected_once {
                        let total = self.metrics.reconnections.inc();
                        tracing::info!(reconnections_total = total, "reconnected");
                    } else {
                        tracing::info!(url = %self.endpoint.url, "connected");
                    }
                    connected_once = true;
                    backoff.reset();

                    match self.run_socket(ws, handler).await {
                        Ok(()) => break,
                        Err(Failure::Handler(e)) => {
                            self.set_state(ConnectionState::Disconnected);
                            tracing::error!(
                                error = %e,
                                error_category = e.category().as_str(),
                                "event handler failed, ending session"
                            );
                            return Err(ClientError::Handler(e));
                        }
                        Err(Failure::Transport(e)) => {
                            tracing::warn!(
                                error = %e,
                                error_category = e.category().as_str(),
                                "connection lost"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        error_category = ErrorCategory::Network.as_str(),
                        "connection_error"
                    );
                }
            }

            if self.stop.is_cancelled() {
                break;
            }
            self.set_state(ConnectionState::Disconnected);
            let delay = backoff.next_delay();
            tracing::debug!(delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
            tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        Ok(())
    }

    /// Request a stop and close the current socket. Idempotent.
    ///
    /// Returns within [`CLOSE_GRACE`] even when the peer stopped reading.
    pub async fn close(&self) {
        if !self.stop.is_cancelled() {
            tracing::info!("closing session");
        }
        self.set_state(ConnectionState::Closing);
        self.stop.cancel();
        let closing = async {
            if let Some(sink) = self.writer.lock().await.as_mut() {
                let _ = sink.close().await;
            }
        };
        if tokio::time::timeout(CLOSE_GRACE, closing).await.is_err() {
            tracing::debug!("closing handshake timed out, dropping socket");
        }
    }

    async fn open(&self) -> Result<WsStream, TransportError> {
        let request = self.endpoint.request()?;
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_frame_bytes);
        ws_config.max_frame_size = Some(self.config.max_frame_bytes);
        let (ws, _response) = connect_async_with_config(request, Some(ws_config), false)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(ws)
    }

    async fn run_socket(&self, ws: WsStream, handler: &dyn EventHandler) -> Result<(), Failure> {
        let (sink, source) = ws.split();
        *self.writer.lock().await = Some(sink);
        self.inbound_pending.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Handshaking);

        let result = async {
            if let Some(session) = &self.config.session {
                self.send_event(&ClientEvent::SessionUpdate {
                    session: session.clone(),
                })
                .await
                .map_err(Failure::Transport)?;
            }
            self.set_state(ConnectionState::Streaming);

            tokio::select! {
                biased;
                () = self.stop.cancelled() => Ok(()),
                failure = self.pump_inbound(source, handler) => Err(failure),
                e = self.pump_audio() => Err(Failure::Transport(e)),
                e = self.keepalive() => Err(Failure::Transport(e)),
            }
        }
        .await;

        let sink = self.writer.lock().await.take();
        match result {
            Err(Failure::Handler(e)) => Err(Failure::Handler(e)),
            _ if self.stop.is_cancelled() => {
                if let Some(mut sink) = sink
                    && tokio::time::timeout(CLOSE_GRACE, sink.close()).await.is_err()
                {
                    tracing::debug!("closing handshake timed out, dropping socket");
                }
                Ok(())
            }
            other => other,
        }
    }

    // ── duties ──────────────────────────────────────────────────────────

    async fn pump_inbound(&self, source: WsSource, handler: &dyn EventHandler) -> Failure {
        let (tx, mut rx) = mpsc::channel(INBOUND_BACKLOG);
        let reader = self.read_frames(source, tx);
        let dispatcher = async {
            while let Some(message) = rx.recv().await {
                let _ = self.inbound_pending.fetch_sub(1, Ordering::SeqCst);
                if let Err(failure) = self.dispatch_message(message, handler).await {
                    return Some(failure);
                }
            }
            None
        };
        tokio::pin!(reader, dispatcher);

        // The reader ends first on a socket failure; frames it already
        // forwarded are still dispatched before the failure is reported.
        tokio::select! {
            biased;
            failure = &mut dispatcher => failure.unwrap_or(Failure::Transport(TransportError::Closed)),
            e = &mut reader => dispatcher.await.unwrap_or(Failure::Transport(e)),
        }
    }

    /// Drain the socket. Control frames are handled here; data frames go
    /// to the dispatcher in arrival order.
    async fn read_frames(&self, mut source: WsSource, tx: mpsc::Sender<Message>) -> TransportError {
        while let Some(frame) = source.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => return map_ws_error(e),
            };
            match message {
                Message::Pong(_) => self.pong.notify_waiters(),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "server closed socket");
                    return TransportError::Closed;
                }
                Message::Ping(_) | Message::Frame(_) => {}
                data @ (Message::Text(_) | Message::Binary(_)) => {
                    let _ = self.inbound_pending.fetch_add(1, Ordering::SeqCst);
                    if tx.send(data).await.is_err() {
                        return TransportError::Closed;
                    }
                }
            }
        }
        TransportError::Closed
    }

    async fn dispatch_message(&self, message: Message, handler: &dyn EventHandler) -> Result<(), Failure> {
        match message {
            Message::Text(text) => self.dispatch(text.as_str(), handler).await,
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => self.dispatch(text, handler).await,
                Err(_) => {
                    tracing::debug!(
                        event_type = "invalid_json",
                        error_category = ErrorCategory::Protocol.as_str(),
                        len = bytes.len(),
                        "discarding non-UTF-8 binary frame"
                    );
                    Ok(())
                }
            },
            _ => Ok(()),
        }
    }

    async fn dispatch(&self, raw: &str, handler: &dyn EventHandler) -> Result<(), Failure> {
        let event = match decode_frame(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    event_type = "invalid_json",
                    error = %e,
                    error_category = ErrorCategory::Protocol.as_str(),
                    raw = rtvoice_core::text::preview(raw, 200),
                    "discarding malformed frame"
                );
                return Ok(());
            }
        };
        tracing::info!(
            event_type = event.event_type(),
            response_id = event.response_id(),
            tokens_total = tokens_total(&event),
            dropped_frames = self.metrics.audio_frames_dropped.get(),
            "event"
        );
        handler.handle(&event).await.map_err(Failure::from)
    }

    async fn pump_audio(&self) -> TransportError {
        let mut rx = self.audio_rx.lock().await;
        while let Some(chunk) = rx.recv().await {
            self.metrics.audio_input_queue_depth.set(rx.len() as u64);
            if let Err(e) = self.send_event(&ClientEvent::audio_append(&chunk)).await {
                return e;
            }
        }
        TransportError::Closed
    }

    async fn keepalive(&self) -> TransportError {
        let Some(interval) = self.config.ping_interval else {
            return std::future::pending().await;
        };
        let timeout = self.config.ping_timeout;
        loop {
            tokio::time::sleep(interval).await;

            let pong = self.pong.notified();
            tokio::pin!(pong);
            let _ = pong.as_mut().enable();

            let deadline = tokio::time::Instant::now() + timeout;
            match tokio::time::timeout_at(deadline, self.send_message(Message::Ping(Default::default()))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return e,
                Err(_) => return TransportError::KeepaliveTimeout(timeout),
            }
            if tokio::time::timeout_at(deadline, pong).await.is_err() {
                // A full backlog parks the reader; the peer is alive but the
                // pong is queued behind frames the handler has not reached.
                let pending = self.inbound_pending.load(Ordering::SeqCst);
                if pending == 0 {
                    return TransportError::KeepaliveTimeout(timeout);
                }
                tracing::debug!(pending, "pong overdue behind inbound backlog");
            }
        }
    }

    // ── outbound ────────────────────────────────────────────────────────

    async fn send_message(&self, message: Message) -> Result<(), TransportError> {
        let send = async {
            let mut writer = self.writer.lock().await;
            let sink = writer.as_mut().ok_or(TransportError::NotConnected)?;
            sink.send(message).await.map_err(map_ws_error)
        };
        tokio::select! {
            biased;
            () = self.stop.cancelled() => Err(TransportError::Closed),
            result = send => result,
        }
    }

    /// Queue a microphone chunk. Never blocks: a full queue drops the chunk
    /// and counts it.
    pub fn append_audio(&self, chunk: Vec<u8>) {
        match self.audio_tx.try_send(chunk) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.metrics.audio_frames_dropped.inc();
                tracing::warn!(
                    event_type = "audio_input_queue_full",
                    dropped_frames = dropped,
                    queue_depth = self.audio_queue_depth(),
                    "audio input queue full, dropping chunk"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("audio queue closed, dropping chunk");
            }
        }
        let depth = self.audio_queue_depth();
        self.metrics.audio_input_queue_depth.set(depth as u64);
        tracing::trace!(queue_depth = depth, "audio_input_queue_depth");
    }

    /// Chunks waiting to be sent.
    pub fn audio_queue_depth(&self) -> usize {
        self.audio_tx.max_capacity() - self.audio_tx.capacity()
    }

    // ── responses ───────────────────────────────────────────────────────

    /// The response currently streaming.
    pub fn active_response(&self) -> Option<String> {
        self.responses.lock().active.clone()
    }

    /// Mark `response_id` as the streaming response.
    pub fn set_active_response(&self, response_id: impl Into<String>) {
        self.responses.lock().active = Some(response_id.into());
    }

    /// Whether `response_id` was canceled locally.
    pub fn is_canceled(&self, response_id: &str) -> bool {
        self.responses.lock().canceled.contains(response_id)
    }

    /// A terminal event arrived for `response_id`: clear it as active and
    /// forget its cancellation record.
    pub fn finish_response(&self, response_id: &str) {
        let mut responses = self.responses.lock();
        if responses.active.as_deref() == Some(response_id) {
            responses.active = None;
        }
        let _ = responses.canceled.remove(response_id);
    }

    /// Cancel `response_id`. It is marked canceled before the request is
    /// sent, so deltas already in flight are dropped.
    pub async fn response_cancel(&self, response_id: &str) -> Result<(), TransportError> {
        {
            let mut responses = self.responses.lock();
            let _ = responses.canceled.insert(response_id.to_string());
            if responses.active.as_deref() == Some(response_id) {
                responses.active = None;
            }
        }
        self.send_event(&ClientEvent::ResponseCancel {
            response_id: response_id.to_string(),
        })
        .await
    }

    /// Cancel the active response, if any. Returns the canceled ID.
    pub async fn cancel_active_response(&self) -> Result<Option<String>, TransportError> {
        let Some(response_id) = self.active_response() else {
            return Ok(None);
        };
        self.response_cancel(&response_id).await?;
        Ok(Some(response_id))
    }
}

#[async_trait]
impl EventSink for RealtimeClient {
    async fn send_event(&self, event: &ClientEvent) -> Result<(), TransportError> {
        let json = serde_json::to_string(event)?;
        self.send_message(Message::Text(json.into())).await
    }
}

#[async_trait]
impl ResponseControl for RealtimeClient {
    fn active_response(&self) -> Option<String> {
        RealtimeClient::active_response(self)
    }

    fn set_active_response(&self, response_id: &str) {
        RealtimeClient::set_active_response(self, response_id);
    }

    fn is_canceled(&self, response_id: &str) -> bool {
        RealtimeClient::is_canceled(self, response_id)
    }

    fn finish_response(&self, response_id: &str) {
        RealtimeClient::finish_response(self, response_id);
    }

    async fn cancel_active_response(&self) -> Result<Option<String>, TransportError> {
        RealtimeClient::cancel_active_response(self).await
    }
}

fn map_ws_error(e: WsError) -> TransportError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
        WsError::Capacity(CapacityError::MessageTooLong { size, max_size }) => {
            TransportError::PayloadTooLarge {
                size,
                limit: max_size,
            }
        }
        other => TransportError::WebSocket(other.to_string()),
    }
}

fn tokens_total(event: &ServerEvent) -> Option<u64> {
    match event {
        ServerEvent::ResponseDone {
            response: Some(body),
            ..
        } => body.usage.map(|u| u.total_tokens),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
