//! Result sinks — stage 3 of the pipeline.
//!
//! A sink drains the result channel until it is closed and empty and persists
//! each item. The channel close (performed by the dispatch loop after every
//! fetch task has finished) is the sink's sole termination signal, so nothing
//! written before the close can be lost.

use crate::error::Result;
use crate::fetcher::FetchResult;
use crate::metrics::Metrics;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Consumer of fetched payloads
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Consume items from `results` until the channel is closed and empty,
    /// persisting each one. Signals completion exactly once, by returning.
    async fn drain(
        &self,
        cancel: CancellationToken,
        results: mpsc::Receiver<FetchResult>,
    ) -> Result<()>;
}

/// Persists each fetched payload as a file under an output directory
///
/// The filename is derived from the URL's host and path. Persistence failures
/// are logged and counted; they never halt the pipeline.
pub struct FileSink {
    output_dir: PathBuf,
    metrics: Arc<Metrics>,
}

impl FileSink {
    /// Create a sink writing into `output_dir` (created on first drain).
    pub fn new(output_dir: impl Into<PathBuf>, metrics: Arc<Metrics>) -> Self {
        Self {
            output_dir: output_dir.into(),
            metrics,
        }
    }

    async fn persist(&self, item: &FetchResult) -> std::io::Result<PathBuf> {
        let name = filename_for_url(&item.url);
        let path = unused_path(&self.output_dir, &name).await;
        tokio::fs::write(&path, &item.body).await?;
        Ok(path)
    }
}

#[async_trait]
impl ResultSink for FileSink {
    async fn drain(
        &self,
        _cancel: CancellationToken,
        mut results: mpsc::Receiver<FetchResult>,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        // No select on the cancellation token here: once the dispatch loop
        // closes the channel, recv() returns None and the drain ends. Items
        // already in the channel at cancellation time are still persisted.
        while let Some(item) = results.recv().await {
            match self.persist(&item).await {
                Ok(path) => {
                    self.metrics.record_persisted();
                    tracing::debug!(url = %item.url, path = %path.display(), "persisted");
                }
                Err(e) => {
                    self.metrics.record_persist_failure();
                    tracing::warn!(url = %item.url, error = %e, "failed to persist result");
                }
            }
        }

        tracing::debug!("result sink finished: channel closed and drained");
        Ok(())
    }
}

/// Derive a filesystem-safe filename from a URL.
///
/// `http://example.com/a/b.html` becomes `example.com_a_b.html`. URLs that do
/// not parse fall back to sanitizing the raw string.
fn filename_for_url(url: &str) -> String {
    let candidate = match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("unknown-host");
            let path = parsed.path().trim_matches('/');
            if path.is_empty() {
                format!("{host}_index")
            } else {
                format!("{host}_{path}")
            }
        }
        Err(_) => url.to_string(),
    };
    sanitize_filename(&candidate)
}

/// Replace characters unsafe in a Linux filename, collapse runs of `_`,
/// trim leading/trailing dots and underscores, and cap at NAME_MAX bytes.
fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let replacement = if c == '\0'
            || c == '/'
            || c == '\\'
            || c == ':'
            || c == '?'
            || c == '&'
            || c == ' '
            || c.is_control()
        {
            '_'
        } else {
            c
        };
        if replacement == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(replacement);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }
    if trimmed.len() > NAME_MAX {
        let mut take = NAME_MAX;
        while take > 0 && !trimmed.is_char_boundary(take) {
            take -= 1;
        }
        trimmed[..take].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Find a path under `dir` that does not collide with an existing file.
///
/// Duplicate URLs are processed independently, so collisions get a numeric
/// suffix (`name.1`, `name.2`, ...).
async fn unused_path(dir: &Path, name: &str) -> PathBuf {
    let base = dir.join(name);
    if !matches!(tokio::fs::try_exists(&base).await, Ok(true)) {
        return base;
    }
    for i in 1u32.. {
        let candidate = dir.join(format!("{name}.{i}"));
        if !matches!(tokio::fs::try_exists(&candidate).await, Ok(true)) {
            return candidate;
        }
    }
    unreachable!("u32 suffix space exhausted")
}
