//! Fetchers — the bounded-parallel middle stage of the pipeline.

use crate::config::Config;
use crate::error::{FetchError, Result};
use crate::metrics::Metrics;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// One fetched payload, handed from a fetch task to the sink
///
/// Ownership transfers to the sink once the item is placed in the result
/// channel.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// URL the payload was fetched from
    pub url: String,
    /// Response body
    pub body: Bytes,
}

/// Retrieves the content of a single URL
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, returning promptly once `cancel` fires.
    ///
    /// Implementations record their own outcome on the metrics collector;
    /// callers only decide whether to forward the result downstream.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> std::result::Result<FetchResult, FetchError>;
}

/// HTTP fetcher backed by a shared `reqwest::Client`
pub struct HttpFetcher {
    client: reqwest::Client,
    metrics: Arc<Metrics>,
}

impl HttpFetcher {
    /// Build a fetcher with the configured timeout and user agent.
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client, metrics })
    }

    async fn do_fetch(&self, url: &str) -> std::result::Result<FetchResult, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else if e.is_connect() {
                FetchError::Connect {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(FetchResult {
            url: url.to_string(),
            body,
        })
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> std::result::Result<FetchResult, FetchError> {
        self.metrics.record_attempt();
        let started = Instant::now();

        // Race the whole request (connect, headers, body) against shutdown so
        // an in-flight fetch aborts at its next await point once cancelled.
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled {
                url: url.to_string(),
            }),
            res = self.do_fetch(url) => res,
        };

        match &result {
            Ok(item) => {
                let elapsed = started.elapsed();
                self.metrics.record_success(item.body.len() as u64, elapsed);
                tracing::debug!(
                    url,
                    bytes = item.body.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "fetched"
                );
            }
            Err(e) if e.is_cancelled() => self.metrics.record_dropped(),
            Err(_) => self.metrics.record_failure(),
        }

        result
    }
}
