//! Jitter-buffered playback pipeline.
//!
//! One playback *epoch* runs from a lazy start in [`AudioPlayer::feed`] to a
//! [`AudioPlayer::stop`]. During an epoch a blocking worker pulls chunks from
//! a bounded queue, accumulates them until the jitter threshold is reached,
//! writes that pre-roll in one call, then writes every further chunk as it
//! arrives. A stop sentinel ends the epoch and releases the device stream.
//!
//! ```text
//!   feed ──► [chunk queue] ──► worker: prebuffer ≥ threshold ─► write(prebuffer)
//!                                      then each chunk       ─► write(chunk)
//!   stop ──► [Stop] ──────────► worker: sink.stop(), exit
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rtvoice_core::ErrorCategory;
use rtvoice_core::metrics::{Counter, Gauge};
use tokio::task::JoinHandle;

use crate::device::{AudioSink, OutputDevice};
use crate::errors::AudioError;
use crate::format::PcmFormat;

/// Playback configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Output PCM layout.
    pub format: PcmFormat,
    /// Pre-roll duration.
    pub jitter_ms: u32,
    /// Queue capacity in chunks.
    pub queue_capacity: usize,
}

impl PlayerConfig {
    /// Bytes to accumulate before the first device write.
    pub fn jitter_threshold(&self) -> usize {
        self.format.bytes_for_ms(self.jitter_ms)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            format: PcmFormat::default(),
            jitter_ms: 120,
            queue_capacity: 128,
        }
    }
}

/// Lifecycle of the playback worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    /// No worker; the next `feed` starts one.
    Stopped,
    /// A `feed` is opening the device.
    Starting,
    /// A worker is consuming the queue.
    Running,
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk queue
// ─────────────────────────────────────────────────────────────────────────────

enum PlaybackItem {
    Chunk(Vec<u8>),
    Stop,
}

/// Bounded for chunks; the stop sentinel is always accepted.
struct ChunkQueue {
    items: Mutex<VecDeque<PlaybackItem>>,
    ready: Condvar,
    capacity: usize,
}

impl ChunkQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn try_push(&self, chunk: Vec<u8>) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return false;
        }
        items.push_back(PlaybackItem::Chunk(chunk));
        drop(items);
        let _ = self.ready.notify_one();
        true
    }

    fn push_stop(&self) {
        self.items.lock().push_back(PlaybackItem::Stop);
        let _ = self.ready.notify_one();
    }

    fn pop_blocking(&self) -> PlaybackItem {
        let mut items = self.items.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            self.ready.wait(&mut items);
        }
    }

    fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let n = items.len();
        items.clear();
        n
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AudioPlayer
// ─────────────────────────────────────────────────────────────────────────────

struct Lifecycle {
    state: PlayerState,
    worker: Option<JoinHandle<Result<(), AudioError>>>,
    epoch: u64,
}

/// Jitter-buffered playback with interruption support.
///
/// `feed`, `flush` and `stop` are serialised by a start-lock, so concurrent
/// feeds never start two workers and a stop never interleaves with a start.
pub struct AudioPlayer {
    config: PlayerConfig,
    device: Arc<dyn OutputDevice>,
    queue: Arc<ChunkQueue>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    dropped: Counter,
    depth: Gauge,
}

impl AudioPlayer {
    /// New stopped player writing to `device`.
    pub fn new(
        config: PlayerConfig,
        device: Arc<dyn OutputDevice>,
        dropped: Counter,
        depth: Gauge,
    ) -> Self {
        Self {
            queue: Arc::new(ChunkQueue::new(config.queue_capacity)),
            config,
            device,
            lifecycle: tokio::sync::Mutex::new(Lifecycle {
                state: PlayerState::Stopped,
                worker: None,
                epoch: 0,
            }),
            dropped,
            depth,
        }
    }

    /// Queue a PCM chunk, starting playback if no worker is running.
    ///
    /// A full queue drops the chunk and counts it; it never blocks.
    pub async fn feed(&self, chunk: Vec<u8>) -> Result<(), AudioError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let mut life = self.lifecycle.lock().await;
        self.ensure_running(&mut life).await?;
        if !self.queue.try_push(chunk) {
            let dropped = self.dropped.inc();
            tracing::warn!(dropped_frames = dropped, "playback queue full, dropping chunk");
        }
        self.depth.set(self.queue.len() as u64);
        Ok(())
    }

    /// Drop everything queued, then [`stop`](Self::stop).
    pub async fn flush(&self) -> Result<(), AudioError> {
        let mut life = self.lifecycle.lock().await;
        let discarded = self.queue.clear();
        self.depth.set(0);
        tracing::debug!(discarded, "playback flushed");
        self.stop_locked(&mut life).await
    }

    /// End the current epoch: queue the sentinel and wait for the worker.
    /// Chunks queued before the call are played first.
    pub async fn stop(&self) -> Result<(), AudioError> {
        let mut life = self.lifecycle.lock().await;
        self.stop_locked(&mut life).await
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> PlayerState {
        self.lifecycle.lock().await.state
    }

    /// Number of epochs started so far.
    pub async fn epochs(&self) -> u64 {
        self.lifecycle.lock().await.epoch
    }

    async fn ensure_running(&self, life: &mut Lifecycle) -> Result<(), AudioError> {
        if life.state == PlayerState::Running {
            let finished = life.worker.as_ref().is_none_or(JoinHandle::is_finished);
            if !finished {
                return Ok(());
            }
            // Worker exited on its own (device error); reap it and start over.
            if let Some(handle) = life.worker.take() {
                log_worker_exit(handle.await);
            }
            let stale = self.queue.clear();
            if stale > 0 {
                tracing::warn!(stale, "discarding chunks left by a failed playback worker");
            }
            life.state = PlayerState::Stopped;
        }

        life.state = PlayerState::Starting;
        let sink = match self.device.open(&self.config.format) {
            Ok(sink) => sink,
            Err(e) => {
                life.state = PlayerState::Stopped;
                tracing::error!(
                    error = %e,
                    error_category = ErrorCategory::Audio.as_str(),
                    "failed to open output device"
                );
                return Err(e);
            }
        };
        let queue = Arc::clone(&self.queue);
        let depth = self.depth.clone();
        let threshold = self.config.jitter_threshold();
        life.worker = Some(tokio::task::spawn_blocking(move || {
            playback_loop(&queue, sink, threshold, &depth)
        }));
        life.epoch += 1;
        life.state = PlayerState::Running;
        tracing::debug!(epoch = life.epoch, threshold, "playback started");
        Ok(())
    }

    async fn stop_locked(&self, life: &mut Lifecycle) -> Result<(), AudioError> {
        if life.state == PlayerState::Stopped {
            return Ok(());
        }
        self.queue.push_stop();
        let result = match life.worker.take() {
            Some(handle) => match handle.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    tracing::warn!(
                        error = %e,
                        error_category = ErrorCategory::Audio.as_str(),
                        "playback worker failed"
                    );
                    Ok(())
                }
                Err(_) => Err(AudioError::WorkerPanicked),
            },
            None => Ok(()),
        };
        // A worker that died early never consumed the sentinel.
        let _ = self.queue.clear();
        self.depth.set(0);
        life.state = PlayerState::Stopped;
        tracing::debug!(epoch = life.epoch, "playback stopped");
        result
    }
}

impl Drop for AudioPlayer {
    fn drop(&mut self) {
        if self.lifecycle.get_mut().state != PlayerState::Stopped {
            self.queue.push_stop();
        }
    }
}

fn log_worker_exit(result: Result<Result<(), AudioError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(
            error = %e,
            error_category = ErrorCategory::Audio.as_str(),
            "playback worker failed"
        ),
        Err(e) => tracing::error!(
            error = %e,
            error_category = ErrorCategory::Audio.as_str(),
            "playback worker panicked"
        ),
    }
}

/// Worker body. Runs on a blocking thread until the sentinel or a write error.
fn playback_loop(
    queue: &ChunkQueue,
    mut sink: Box<dyn AudioSink>,
    threshold: usize,
    depth: &Gauge,
) -> Result<(), AudioError> {
    let result = drain_into(queue, sink.as_mut(), threshold, depth);
    let stopped = sink.stop();
    result.and(stopped)
}

fn drain_into(
    queue: &ChunkQueue,
    sink: &mut dyn AudioSink,
    threshold: usize,
    depth: &Gauge,
) -> Result<(), AudioError> {
    let mut prebuffer: Vec<u8> = Vec::with_capacity(threshold);
    let mut primed = false;
    loop {
        let item = queue.pop_blocking();
        depth.set(queue.len() as u64);
        match item {
            PlaybackItem::Stop => {
                if !prebuffer.is_empty() {
                    tracing::debug!(bytes = prebuffer.len(), "discarding partial pre-roll");
                }
                return Ok(());
            }
            PlaybackItem::Chunk(chunk) if primed => sink.write(&chunk)?,
            PlaybackItem::Chunk(chunk) => {
                prebuffer.extend_from_slice(&chunk);
                if prebuffer.len() >= threshold {
                    sink.write(&prebuffer)?;
                    prebuffer = Vec::new();
                    primed = true;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
