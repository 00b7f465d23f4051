//! Conversation, transport, and transcript backfill settings.

use serde::{Deserialize, Serialize};

/// How the summary language is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguagePolicy {
    /// Detect from the conversation, falling back to the base language.
    #[default]
    Auto,
    /// Always the base language.
    #[serde(rename = "en")]
    Fixed,
    /// Detect and insist on the detected language.
    Force,
}

impl LanguagePolicy {
    /// Parse the settings / env spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "en" | "fixed" => Some(Self::Fixed),
            "force" => Some(Self::Force),
            _ => None,
        }
    }
}

/// Context summarization settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummarySettings {
    /// Token count that triggers a summary.
    pub trigger_tokens: u64,
    /// Turns kept verbatim after a summary.
    pub keep_last_turns: usize,
    /// Summary language selection.
    pub language_policy: LanguagePolicy,
    /// Language used when detection finds nothing.
    pub base_language: String,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            trigger_tokens: 2000,
            keep_last_turns: 2,
            language_policy: LanguagePolicy::Auto,
            base_language: "en".to_string(),
        }
    }
}

/// Socket lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// First reconnect delay.
    pub backoff_base_ms: u64,
    /// Reconnect delay ceiling.
    pub backoff_max_ms: u64,
    /// Keepalive ping interval; `0` disables keepalive.
    pub ping_interval_ms: u64,
    /// How long to wait for a pong.
    pub ping_timeout_ms: u64,
    /// Outbound microphone queue capacity in chunks.
    pub audio_queue_capacity: usize,
    /// Largest accepted inbound frame.
    pub max_frame_bytes: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            backoff_base_ms: 500,
            backoff_max_ms: 8000,
            ping_interval_ms: 10_000,
            ping_timeout_ms: 20_000,
            audio_queue_capacity: 64,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Transcript backfill settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptSettings {
    /// Retrieve attempts per item.
    pub fetch_attempts: u32,
    /// Delay unit; attempt `n` is followed by `n × fetchDelayMs`.
    pub fetch_delay_ms: u64,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            fetch_attempts: 5,
            fetch_delay_ms: 400,
        }
    }
}
