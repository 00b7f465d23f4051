//! PCM16 mono framing arithmetic.

use std::time::Duration;

/// Fixed-rate interleaved PCM layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    /// Samples per second.
    pub sample_rate_hz: u32,
    /// Interleaved channels.
    pub channels: u16,
    /// Bytes per sample per channel.
    pub bytes_per_sample: u16,
}

impl PcmFormat {
    /// Mono PCM16 at `sample_rate_hz`.
    pub fn pcm16_mono(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            channels: 1,
            bytes_per_sample: 2,
        }
    }

    /// Bytes per second of audio.
    pub fn byte_rate(&self) -> u64 {
        u64::from(self.sample_rate_hz) * u64::from(self.channels) * u64::from(self.bytes_per_sample)
    }

    /// Bytes covering `ms` milliseconds, computed as
    /// `sample_rate × ms / 1000 × bytes_per_sample × channels`.
    pub fn bytes_for_ms(&self, ms: u32) -> usize {
        let samples = u64::from(self.sample_rate_hz) * u64::from(ms) / 1000;
        (samples * u64::from(self.bytes_per_sample) * u64::from(self.channels)) as usize
    }

    /// Playback duration of `bytes`.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let rate = self.byte_rate();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / rate as f64)
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::pcm16_mono(24_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_bytes_for_default_format() {
        // 24000 × 120 / 1000 × 2
        assert_eq!(PcmFormat::default().bytes_for_ms(120), 5760);
        assert_eq!(PcmFormat::default().bytes_for_ms(0), 0);
    }

    #[test]
    fn chunk_bytes_for_default_format() {
        assert_eq!(PcmFormat::default().bytes_for_ms(40), 1920);
    }

    #[test]
    fn duration_of_one_second() {
        let f = PcmFormat::pcm16_mono(16_000);
        assert_eq!(f.duration_of(32_000), Duration::from_secs(1));
    }
}
