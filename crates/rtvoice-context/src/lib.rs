//! # rtvoice-context
//!
//! Client-side conversation log with automatic summarization.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`conversation`] | [`Turn`] and [`ConversationState`] |
//! | [`policy`] | [`SummaryPolicy`]: trigger rule and language selection |
//! | [`manager`] | [`ContextManager`]: append, backfill, usage, summarize-and-prune |
//! | [`summarizer`] | [`Summarizer`] trait, HTTP and offline implementations |
//! | [`redaction`] | [`Redact`] trait and regex [`Redactor`] |
//!
//! ## Crate Position
//!
//! Depends on rtvoice-core (events, sink trait, metrics) and rtvoice-settings
//! (language policy). Used by rtvoice-runtime.

#![deny(unsafe_code)]

pub mod conversation;
pub mod manager;
pub mod policy;
pub mod redaction;
pub mod summarizer;

pub use conversation::{ConversationState, Turn};
pub use manager::{Backfill, ContextManager, SummaryOutcome};
pub use policy::SummaryPolicy;
pub use redaction::{Redact, Redactor};
pub use summarizer::{ExtractiveSummarizer, OpenAiSummarizer, Summarizer, SummarizerError};
