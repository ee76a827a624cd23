//! URL sources — stage 1 of the pipeline.
//!
//! A source streams URL tokens into the bounded URL channel and closes it
//! (by dropping the sender) when the input is exhausted or cancellation is
//! observed. The channel close is what tells the dispatch loop "no more URLs".

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Producer of URL tokens for the pipeline
#[async_trait]
pub trait UrlSource: Send + Sync {
    /// Stream URLs into `urls` until the input is exhausted or `cancel` fires.
    ///
    /// Implementations must close the channel on every exit path; with tokio
    /// mpsc that happens automatically when the sender is dropped.
    async fn stream_urls(&self, cancel: CancellationToken, urls: mpsc::Sender<String>)
    -> Result<()>;
}

/// Reads one URL per line from a local file
///
/// Blank lines and surrounding whitespace are skipped; no deduplication is
/// performed, duplicate URLs are fetched independently.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a source over the given input file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UrlSource for FileSource {
    async fn stream_urls(
        &self,
        cancel: CancellationToken,
        urls: mpsc::Sender<String>,
    ) -> Result<()> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut produced: u64 = 0;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(produced, "url source stopping: cancellation observed");
                    break;
                }
                line = lines.next_line() => line?,
            };

            let Some(line) = line else { break };
            let url = line.trim();
            if url.is_empty() {
                continue;
            }

            // Sending blocks while the channel is full; that backpressure is
            // what keeps the file read paced to the fetch pool. Stay
            // responsive to cancellation while blocked.
            let send = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(produced, "url source stopping: cancellation observed");
                    break;
                }
                res = urls.send(url.to_string()) => res,
            };
            if send.is_err() {
                // Receiver gone; the dispatch loop has already shut down.
                break;
            }
            produced += 1;
        }

        tracing::debug!(produced, "url source finished");
        Ok(())
        // `urls` dropped here: closes the channel on every exit path.
    }
}
