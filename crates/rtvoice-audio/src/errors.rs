//! Audio error types.

/// Failures from devices, sources, or the playback worker.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// The output device or input source could not be opened.
    #[error("failed to open {what}: {source}")]
    Open {
        /// Device or source description.
        what: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Reading or writing PCM failed.
    #[error("audio I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The playback worker panicked.
    #[error("playback worker panicked")]
    WorkerPanicked,
}
