//! Audio format and device settings.

use serde::{Deserialize, Serialize};

/// PCM framing and playback settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioSettings {
    /// Sample rate for both directions.
    pub sample_rate_hz: u32,
    /// Microphone chunk duration.
    pub chunk_ms: u32,
    /// Bytes per mono sample (PCM16 = 2).
    pub bytes_per_sample: u32,
    /// Playback pre-roll before the first device write.
    pub jitter_ms: u32,
    /// Playback queue capacity in chunks.
    pub output_queue_capacity: usize,
    /// Raw PCM input file; stdin when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    /// Raw PCM output file; stdout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate_hz: 24_000,
            chunk_ms: 40,
            bytes_per_sample: 2,
            jitter_ms: 120,
            output_queue_capacity: 128,
            input_path: None,
            output_path: None,
        }
    }
}

impl AudioSettings {
    /// Bytes in one microphone chunk.
    pub fn chunk_bytes(&self) -> usize {
        (u64::from(self.sample_rate_hz) * u64::from(self.chunk_ms) / 1000
            * u64::from(self.bytes_per_sample)) as usize
    }
}
