//! Output devices.
//!
//! A [`OutputDevice`] is opened once per playback epoch and yields an
//! [`AudioSink`] that the playback worker writes to from a blocking thread.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::AudioError;
use crate::format::PcmFormat;

/// An open output stream. Called only from the playback worker thread.
pub trait AudioSink: Send {
    /// Write PCM bytes, blocking until accepted.
    fn write(&mut self, pcm: &[u8]) -> Result<(), AudioError>;
    /// Flush and release the stream.
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Opens output streams.
pub trait OutputDevice: Send + Sync {
    /// Open a fresh stream for one playback epoch.
    fn open(&self, format: &PcmFormat) -> Result<Box<dyn AudioSink>, AudioError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// WriterDevice
// ─────────────────────────────────────────────────────────────────────────────

enum WriterTarget {
    Stdout,
    File(PathBuf),
}

/// Raw PCM to stdout or an appended file (a named pipe works too).
pub struct WriterDevice {
    target: WriterTarget,
}

impl WriterDevice {
    /// Write to standard output.
    pub fn stdout() -> Self {
        Self {
            target: WriterTarget::Stdout,
        }
    }

    /// Append to `path`, creating it if needed.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            target: WriterTarget::File(path.into()),
        }
    }
}

impl OutputDevice for WriterDevice {
    fn open(&self, format: &PcmFormat) -> Result<Box<dyn AudioSink>, AudioError> {
        let writer: Box<dyn Write + Send> = match &self.target {
            WriterTarget::Stdout => Box::new(std::io::stdout()),
            WriterTarget::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| AudioError::Open {
                        what: path.display().to_string(),
                        source,
                    })?;
                Box::new(file)
            }
        };
        tracing::debug!(sample_rate = format.sample_rate_hz, "output stream opened");
        Ok(Box::new(WriterSink { writer }))
    }
}

struct WriterSink {
    writer: Box<dyn Write + Send>,
}

impl AudioSink for WriterSink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        self.writer.write_all(pcm)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.writer.flush()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryDevice
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryLog {
    writes: Vec<Vec<u8>>,
    opens: usize,
    stops: usize,
}

/// Records every write in memory. Clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryDevice {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemoryDevice {
    /// Empty device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.log.lock().writes.clone()
    }

    /// Lengths of every write so far.
    pub fn write_lengths(&self) -> Vec<usize> {
        self.log.lock().writes.iter().map(Vec::len).collect()
    }

    /// Streams opened.
    pub fn opens(&self) -> usize {
        self.log.lock().opens
    }

    /// Streams stopped.
    pub fn stops(&self) -> usize {
        self.log.lock().stops
    }

    /// Wait until at least `n` writes were recorded, polling every few ms.
    /// Returns whether the count was reached before `timeout`.
    pub async fn wait_for_writes(&self, n: usize, timeout: std::time::Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.log.lock().writes.len() >= n {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

impl OutputDevice for MemoryDevice {
    fn open(&self, _format: &PcmFormat) -> Result<Box<dyn AudioSink>, AudioError> {
        self.log.lock().opens += 1;
        Ok(Box::new(MemorySink {
            log: Arc::clone(&self.log),
        }))
    }
}

struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
}

impl AudioSink for MemorySink {
    fn write(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        self.log.lock().writes.push(pcm.to_vec());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.log.lock().stops += 1;
        Ok(())
    }
}
