//! Error taxonomy shared by the transport and the event handlers.
//!
//! The split that matters is between [`TransportError`] (socket-level, always
//! recovered by reconnecting) and the remaining [`HandlerError`] variants
//! (application bugs, propagated to the caller).

use std::time::Duration;

/// Boxed error for collaborator failures that cross crate boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Coarse category attached to error logs as `error_category`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Socket, DNS, TLS, timeouts.
    Network,
    /// Malformed or unexpected wire data.
    Protocol,
    /// Playback or capture device.
    Audio,
    /// Remote HTTP APIs (summarizer, tools).
    Api,
}

impl ErrorCategory {
    /// Log spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Protocol => "protocol",
            Self::Audio => "audio",
            Self::Api => "api",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Socket-layer failures. Every variant triggers the reconnect path.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the socket failed.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The peer closed the socket.
    #[error("connection closed")]
    Closed,
    /// WebSocket protocol violation or I/O error.
    #[error("websocket error: {0}")]
    WebSocket(String),
    /// A frame exceeded the configured size limit.
    #[error("payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge {
        /// Frame size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
    /// No pong arrived within the keepalive timeout.
    #[error("keepalive timed out after {0:?}")]
    KeepaliveTimeout(Duration),
    /// A send was attempted while no socket is open.
    #[error("not connected")]
    NotConnected,
    /// An outbound event could not be serialised.
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Log category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Encode(_) | Self::PayloadTooLarge { .. } => ErrorCategory::Protocol,
            _ => ErrorCategory::Network,
        }
    }
}

/// Failures raised while handling an inbound event.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A send failed because the socket went away; treated as a transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The playback pipeline failed.
    #[error("audio pipeline failed: {0}")]
    Audio(#[source] BoxError),
    /// Any other application failure.
    #[error("{context}: {source}")]
    Application {
        /// What the handler was doing.
        context: &'static str,
        /// Underlying error.
        #[source]
        source: BoxError,
    },
}

impl HandlerError {
    /// Wrap an arbitrary error with handler context.
    pub fn application(
        context: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Application {
            context,
            source: source.into(),
        }
    }

    /// Wrap an audio pipeline error.
    pub fn audio(source: impl Into<BoxError>) -> Self {
        Self::Audio(source.into())
    }

    /// Whether this error should be handled by reconnecting.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Log category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(e) => e.category(),
            Self::Audio(_) => ErrorCategory::Audio,
            Self::Application { .. } => ErrorCategory::Protocol,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
