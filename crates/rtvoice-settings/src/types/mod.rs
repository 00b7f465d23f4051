//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a settings file only needs the fields it overrides. Each type implements
//! [`Default`] with production values.

mod api;
mod audio;
mod session;

pub use api::*;
pub use audio::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "api": { "voice": "alloy" },
///   "summary": { "triggerTokens": 4000, "keepLastTurns": 4 },
///   "transport": { "pingIntervalMs": 0 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceSettings {
    /// Remote service and models.
    pub api: ApiSettings,
    /// PCM framing and playback.
    pub audio: AudioSettings,
    /// Context summarization.
    pub summary: SummarySettings,
    /// Socket lifecycle.
    pub transport: TransportSettings,
    /// Transcript backfill.
    pub transcripts: TranscriptSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// PII masking.
    pub redaction: RedactionSettings,
    /// Function tools offered to the model.
    pub tools: ToolSettings,
}

impl VoiceSettings {
    /// Replace zero sizes and rates with defaults and fix inverted ranges.
    ///
    /// Called automatically during loading. Invalid values are corrected with
    /// a warning rather than rejected.
    pub fn validate(&mut self) {
        fn nonzero<T: PartialEq + Default + Copy + std::fmt::Display>(
            val: &mut T,
            fallback: T,
            name: &str,
        ) {
            if *val == T::default() {
                tracing::warn!("{name} must be positive, using {fallback}");
                *val = fallback;
            }
        }

        let audio_defaults = AudioSettings::default();
        let a = &mut self.audio;
        nonzero(&mut a.sample_rate_hz, audio_defaults.sample_rate_hz, "sample_rate_hz");
        nonzero(&mut a.chunk_ms, audio_defaults.chunk_ms, "chunk_ms");
        nonzero(&mut a.bytes_per_sample, audio_defaults.bytes_per_sample, "bytes_per_sample");
        nonzero(
            &mut a.output_queue_capacity,
            audio_defaults.output_queue_capacity,
            "output_queue_capacity",
        );

        let transport_defaults = TransportSettings::default();
        let t = &mut self.transport;
        nonzero(&mut t.backoff_base_ms, transport_defaults.backoff_base_ms, "backoff_base_ms");
        nonzero(
            &mut t.audio_queue_capacity,
            transport_defaults.audio_queue_capacity,
            "audio_queue_capacity",
        );
        nonzero(&mut t.max_frame_bytes, transport_defaults.max_frame_bytes, "max_frame_bytes");
        nonzero(&mut t.ping_timeout_ms, transport_defaults.ping_timeout_ms, "ping_timeout_ms");
        if t.backoff_max_ms < t.backoff_base_ms {
            tracing::warn!(
                "backoff_max_ms ({}) < backoff_base_ms ({}), correcting",
                t.backoff_max_ms,
                t.backoff_base_ms
            );
            t.backoff_max_ms = t.backoff_base_ms;
        }

        if self.summary.base_language.trim().is_empty() {
            tracing::warn!("base_language is empty, using en");
            self.summary.base_language = "en".to_string();
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `plain` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

/// PII redaction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedactionSettings {
    /// Mask e-mail addresses and phone numbers in stored transcripts.
    pub enabled: bool,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Tool settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    /// Advertise and serve the built-in tools.
    pub enabled: bool,
    /// Timeout for the `http_get` tool.
    pub http_timeout_ms: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            http_timeout_ms: 10_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = VoiceSettings::default();
        assert_eq!(s.api.provider, Provider::OpenAi);
        assert_eq!(s.api.realtime_model, "gpt-4o-realtime-preview");
        assert_eq!(s.api.voice, "shimmer");
        assert_eq!(s.api.summary_model, "gpt-4o-mini");
        assert_eq!(s.audio.sample_rate_hz, 24_000);
        assert_eq!(s.audio.jitter_ms, 120);
        assert_eq!(s.summary.trigger_tokens, 2000);
        assert_eq!(s.summary.keep_last_turns, 2);
        assert_eq!(s.transport.audio_queue_capacity, 64);
        assert_eq!(s.transcripts.fetch_attempts, 5);
        assert!(s.redaction.enabled);
    }

    #[test]
    fn chunk_bytes_for_defaults() {
        // 24000 Hz × 40 ms × 2 bytes
        assert_eq!(AudioSettings::default().chunk_bytes(), 1920);
    }

    #[test]
    fn empty_json_produces_defaults() {
        let s: VoiceSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s.api.voice, "shimmer");
        assert_eq!(s.transport.backoff_base_ms, 500);
    }

    #[test]
    fn partial_json_overrides() {
        let json = serde_json::json!({
            "summary": { "triggerTokens": 4000 },
            "api": { "provider": "azure" }
        });
        let s: VoiceSettings = serde_json::from_value(json).unwrap();
        assert_eq!(s.summary.trigger_tokens, 4000);
        assert_eq!(s.summary.keep_last_turns, 2);
        assert_eq!(s.api.provider, Provider::Azure);
    }

    #[test]
    fn field_names_are_camel_case() {
        let json = serde_json::to_value(VoiceSettings::default()).unwrap();
        assert!(json["transport"].get("pingIntervalMs").is_some());
        assert!(json["summary"].get("keepLastTurns").is_some());
        assert!(json["api"].get("azureEndpoint").is_none());
        assert_eq!(json["summary"]["languagePolicy"], "auto");
    }

    #[test]
    fn language_policy_spellings() {
        let s: SummarySettings =
            serde_json::from_value(serde_json::json!({"languagePolicy": "en"})).unwrap();
        assert_eq!(s.language_policy, LanguagePolicy::Fixed);
        assert_eq!(LanguagePolicy::parse("FORCE"), Some(LanguagePolicy::Force));
        assert_eq!(LanguagePolicy::parse("fr"), None);
    }

    #[test]
    fn validate_replaces_zero_values() {
        let mut s = VoiceSettings::default();
        s.audio.sample_rate_hz = 0;
        s.transport.audio_queue_capacity = 0;
        s.validate();
        assert_eq!(s.audio.sample_rate_hz, 24_000);
        assert_eq!(s.transport.audio_queue_capacity, 64);
    }

    #[test]
    fn validate_corrects_inverted_backoff() {
        let mut s = VoiceSettings::default();
        s.transport.backoff_base_ms = 2000;
        s.transport.backoff_max_ms = 100;
        s.validate();
        assert_eq!(s.transport.backoff_max_ms, 2000);
    }

    #[test]
    fn validate_keeps_zero_ping_interval() {
        let mut s = VoiceSettings::default();
        s.transport.ping_interval_ms = 0;
        s.validate();
        assert_eq!(s.transport.ping_interval_ms, 0);
    }
}
