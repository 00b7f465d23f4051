//! # rtvoice-audio
//!
//! PCM audio plumbing for the voice session.
//!
//! - [`AudioPlayer`]: bounded chunk queue, jitter pre-roll, and a playback
//!   worker with `feed` / `flush` / `stop` and lazy restart
//! - [`OutputDevice`] / [`AudioSink`]: where playback bytes go
//! - [`MicSource`]: restartable stream of fixed-size PCM16 chunks
//!
//! ## Crate Position
//!
//! Depends on rtvoice-core (metrics handles). Used by rtvoice-runtime.

#![deny(unsafe_code)]

pub mod device;
pub mod errors;
pub mod format;
pub mod input;
pub mod output;

pub use device::{AudioSink, MemoryDevice, OutputDevice, WriterDevice};
pub use errors::AudioError;
pub use format::PcmFormat;
pub use input::{MicSource, ReaderMic};
pub use output::{AudioPlayer, PlayerConfig, PlayerState};
