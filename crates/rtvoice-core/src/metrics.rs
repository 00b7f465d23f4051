//! Injectable session counters.
//!
//! Each handle keeps its own value (so tests can read and reset it without a
//! global recorder) and mirrors every update to the `metrics` facade under the
//! names in [`names`], where an installed recorder can export them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metric names.
pub mod names {
    /// Successful reconnects after a prior successful connection.
    pub const RECONNECTIONS_TOTAL: &str = "reconnections_total";
    /// Microphone chunks dropped because the outbound queue was full.
    pub const AUDIO_FRAMES_DROPPED_TOTAL: &str = "audio_frames_dropped_total";
    /// Reply chunks dropped because the playback queue was full.
    pub const AUDIO_OUTPUT_DROPPED_TOTAL: &str = "audio_output_dropped_total";
    /// Turns appended to the conversation log.
    pub const TURNS_TOTAL: &str = "turns_total";
    /// Committed summaries.
    pub const SUMMARIES_TOTAL: &str = "summaries_total";
    /// Chunks waiting in the outbound audio queue.
    pub const AUDIO_INPUT_QUEUE_DEPTH: &str = "audio_input_queue_depth";
    /// Chunks waiting in the playback queue.
    pub const AUDIO_OUTPUT_QUEUE_DEPTH: &str = "audio_output_queue_depth";
}

/// Monotonic counter with an explicit reset.
#[derive(Clone, Debug)]
pub struct Counter {
    name: &'static str,
    value: Arc<AtomicU64>,
}

impl Counter {
    /// New counter starting at zero.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Add one and return the new value.
    pub fn inc(&self) -> u64 {
        self.add(1)
    }

    /// Add `n` and return the new value.
    pub fn add(&self, n: u64) -> u64 {
        let prev = self.value.fetch_add(n, Ordering::Relaxed);
        metrics::counter!(self.name).increment(n);
        prev + n
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset the local value to zero.
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }

    /// Metric name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Point-in-time value.
#[derive(Clone, Debug)]
pub struct Gauge {
    name: &'static str,
    value: Arc<AtomicU64>,
}

impl Gauge {
    /// New gauge at zero.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the current value.
    pub fn set(&self, v: u64) {
        self.value.store(v, Ordering::Relaxed);
        metrics::gauge!(self.name).set(v as f64);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.set(0);
    }
}

/// All counters for one session, cloned into each component that updates them.
#[derive(Clone, Debug)]
pub struct SessionMetrics {
    /// See [`names::RECONNECTIONS_TOTAL`].
    pub reconnections: Counter,
    /// See [`names::AUDIO_FRAMES_DROPPED_TOTAL`].
    pub audio_frames_dropped: Counter,
    /// See [`names::AUDIO_OUTPUT_DROPPED_TOTAL`].
    pub audio_output_dropped: Counter,
    /// See [`names::TURNS_TOTAL`].
    pub turns: Counter,
    /// See [`names::SUMMARIES_TOTAL`].
    pub summaries: Counter,
    /// See [`names::AUDIO_INPUT_QUEUE_DEPTH`].
    pub audio_input_queue_depth: Gauge,
    /// See [`names::AUDIO_OUTPUT_QUEUE_DEPTH`].
    pub audio_output_queue_depth: Gauge,
}

impl SessionMetrics {
    /// Fresh set of zeroed handles.
    pub fn new() -> Self {
        Self {
            reconnections: Counter::new(names::RECONNECTIONS_TOTAL),
            audio_frames_dropped: Counter::new(names::AUDIO_FRAMES_DROPPED_TOTAL),
            audio_output_dropped: Counter::new(names::AUDIO_OUTPUT_DROPPED_TOTAL),
            turns: Counter::new(names::TURNS_TOTAL),
            summaries: Counter::new(names::SUMMARIES_TOTAL),
            audio_input_queue_depth: Gauge::new(names::AUDIO_INPUT_QUEUE_DEPTH),
            audio_output_queue_depth: Gauge::new(names::AUDIO_OUTPUT_QUEUE_DEPTH),
        }
    }

    /// Zero every handle.
    pub fn reset(&self) {
        self.reconnections.reset();
        self.audio_frames_dropped.reset();
        self.audio_output_dropped.reset();
        self.turns.reset();
        self.summaries.reset();
        self.audio_input_queue_depth.reset();
        self.audio_output_queue_depth.reset();
    }
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_counts_and_resets() {
        let c = Counter::new("test_counter");
        assert_eq!(c.inc(), 1);
        assert_eq!(c.add(4), 5);
        assert_eq!(c.get(), 5);
        c.reset();
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn clones_share_state() {
        let m = SessionMetrics::new();
        let clone = m.clone();
        let _ = clone.turns.inc();
        assert_eq!(m.turns.get(), 1);
    }

    #[test]
    fn gauge_tracks_latest() {
        let g = Gauge::new("test_gauge");
        g.set(7);
        g.set(3);
        assert_eq!(g.get(), 3);
    }

    #[test]
    fn reset_zeroes_everything() {
        let m = SessionMetrics::new();
        let _ = m.reconnections.inc();
        let _ = m.audio_frames_dropped.add(3);
        m.audio_output_queue_depth.set(9);
        m.reset();
        assert_eq!(m.reconnections.get(), 0);
        assert_eq!(m.audio_frames_dropped.get(), 0);
        assert_eq!(m.audio_output_queue_depth.get(), 0);
    }

    #[test]
    fn names_are_snake_case() {
        let m = SessionMetrics::new();
        assert_eq!(m.reconnections.name(), "reconnections_total");
        assert_eq!(m.summaries.name(), "summaries_total");
    }
}
