//! Microphone sources.
//!
//! A [`MicSource`] hands out a fresh chunk stream on every call to
//! [`MicSource::chunks`], so capture can be restarted after a reconnect.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::errors::AudioError;
use crate::format::PcmFormat;

/// Produces fixed-size PCM16 mono chunks.
pub trait MicSource: Send + Sync {
    /// Start a new capture stream. Ends when the underlying input ends.
    fn chunks(&self) -> BoxStream<'static, Result<Vec<u8>, AudioError>>;
}

type Opener = Arc<dyn Fn() -> Result<Box<dyn AsyncRead + Send + Unpin>, AudioError> + Send + Sync>;

/// Raw PCM read from a file, stdin, or any reader factory.
///
/// When pacing is on, one chunk is yielded per chunk duration so a file
/// plays back at the speed a live microphone would deliver it.
pub struct ReaderMic {
    opener: Opener,
    chunk_bytes: usize,
    pace: Option<Duration>,
}

impl ReaderMic {
    /// Build from a reader factory called once per stream.
    pub fn from_opener<F>(opener: F, format: PcmFormat, chunk_ms: u32) -> Self
    where
        F: Fn() -> Result<Box<dyn AsyncRead + Send + Unpin>, AudioError> + Send + Sync + 'static,
    {
        Self {
            opener: Arc::new(opener),
            chunk_bytes: format.bytes_for_ms(chunk_ms).max(1),
            pace: Some(Duration::from_millis(u64::from(chunk_ms))),
        }
    }

    /// Read from a raw PCM file, reopened on each stream.
    pub fn file(path: impl Into<PathBuf>, format: PcmFormat, chunk_ms: u32) -> Self {
        let path = path.into();
        Self::from_opener(
            move || {
                let file = std::fs::File::open(&path).map_err(|source| AudioError::Open {
                    what: path.display().to_string(),
                    source,
                })?;
                Ok(Box::new(tokio::fs::File::from_std(file)) as Box<dyn AsyncRead + Send + Unpin>)
            },
            format,
            chunk_ms,
        )
    }

    /// Read from standard input.
    pub fn stdin(format: PcmFormat, chunk_ms: u32) -> Self {
        Self::from_opener(
            || Ok(Box::new(tokio::io::stdin()) as Box<dyn AsyncRead + Send + Unpin>),
            format,
            chunk_ms,
        )
    }

    /// Disable real-time pacing.
    #[must_use]
    pub fn unpaced(mut self) -> Self {
        self.pace = None;
        self
    }

    /// Bytes per yielded chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }
}

impl MicSource for ReaderMic {
    fn chunks(&self) -> BoxStream<'static, Result<Vec<u8>, AudioError>> {
        let opener = Arc::clone(&self.opener);
        let chunk_bytes = self.chunk_bytes;
        let pace = self.pace;
        Box::pin(async_stream::try_stream! {
            let mut reader = opener()?;
            let mut ticker = pace.map(|period| {
                let mut t = tokio::time::interval(period);
                t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                t
            });
            loop {
                let chunk = read_chunk(&mut reader, chunk_bytes).await?;
                if chunk.is_empty() {
                    break;
                }
                if let Some(t) = ticker.as_mut() {
                    let _ = t.tick().await;
                }
                let short = chunk.len() < chunk_bytes;
                yield chunk;
                if short {
                    break;
                }
            }
        })
    }
}

/// Fill up to `n` bytes, returning fewer only at end of input.
async fn read_chunk<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    n: usize,
) -> Result<Vec<u8>, AudioError> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::StreamExt;

    fn format() -> PcmFormat {
        // 1 byte per ms
        PcmFormat {
            sample_rate_hz: 1000,
            channels: 1,
            bytes_per_sample: 1,
        }
    }

    #[tokio::test]
    async fn file_is_split_into_chunks_with_short_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.pcm");
        std::fs::write(&path, vec![7u8; 25]).unwrap();

        let mic = ReaderMic::file(&path, format(), 10).unpaced();
        let chunks: Vec<_> = mic.chunks().map(Result::unwrap).collect().await;
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn each_call_restarts_from_the_beginning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.pcm");
        std::fs::write(&path, (0u8..20).collect::<Vec<_>>()).unwrap();

        let mic = ReaderMic::file(&path, format(), 10).unpaced();
        let first: Vec<_> = mic.chunks().map(Result::unwrap).collect().await;
        let second: Vec<_> = mic.chunks().map(Result::unwrap).collect().await;
        assert_eq!(first, second);
        assert_eq!(first[0][0], 0);
    }

    #[tokio::test]
    async fn missing_file_yields_open_error() {
        let mic = ReaderMic::file("/nonexistent/in.pcm", format(), 10).unpaced();
        let mut stream = mic.chunks();
        assert_matches!(stream.next().await, Some(Err(AudioError::Open { .. })));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_spaces_chunks_by_duration() {
        let mic = ReaderMic::from_opener(
            || Ok(Box::new(std::io::Cursor::new(vec![0u8; 30])) as Box<dyn AsyncRead + Send + Unpin>),
            format(),
            10,
        );
        let start = tokio::time::Instant::now();
        let chunks: Vec<_> = mic.chunks().map(Result::unwrap).collect().await;
        assert_eq!(chunks.len(), 3);
        // First tick is immediate, then one per 10 ms.
        assert_eq!(start.elapsed(), Duration::from_millis(20));
    }
}
