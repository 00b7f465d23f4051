//! # rtvoice-runtime
//!
//! Event handling and session assembly.
//!
//! - **Dispatcher**: tag-keyed routing table implementing `EventHandler`
//! - **Handlers**: barge-in, audio deltas, response lifecycle, item
//!   created/retrieved, summarization triggers
//! - **Fetcher**: bounded background `conversation.item.retrieve` polling for
//!   user turns without a transcript
//! - **Tools**: registry, built-in `clock` and `http_get`, tool-call handler
//! - **Session**: [`VoiceSession`] wiring client, playback, context, fetcher,
//!   routing and microphone capture
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on rtvoice-core, rtvoice-settings,
//! rtvoice-transport, rtvoice-context, rtvoice-audio.
//! Depended on by: rtvoice (binary).

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod fetcher;
pub mod handlers;
pub mod session;
pub mod tools;

pub use dispatcher::Dispatcher;
pub use fetcher::TranscriptFetcher;
pub use handlers::{SESSION_EVENT_TYPES, SessionHandlers};
pub use session::{
    SessionError, SessionParts, VoiceSession, redactor_for, session_config, summarizer_for, tools_for,
};
pub use tools::{ClockTool, HttpGetTool, Tool, ToolCallHandler, ToolError, ToolRegistry};
