//! Settings error types.

use std::path::PathBuf;

/// Failures while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file (or the merged result) is not valid settings JSON.
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings result alias.
pub type Result<T> = std::result::Result<T, SettingsError>;
