//! # sitefetch
//!
//! Concurrent URL fetcher with bounded parallelism and graceful shutdown.
//!
//! A run streams URLs out of an input file, fetches them with at most
//! `max_concurrent_fetches` requests in flight, and persists each response.
//! The three stages (source, fetch pool, sink) progress independently,
//! connected by bounded channels, and share a single one-shot cancellation
//! token: the first interrupt starts a fixed grace period, after which the
//! token fires and every stage winds down in order — the source closes the
//! URL channel, the dispatch loop drains its in-flight fetches and closes the
//! result channel, and the sink persists whatever was already queued.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sitefetch::{Config, FileSink, FileSource, HttpFetcher, Metrics, Pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> sitefetch::Result<()> {
//!     let config = Arc::new(Config::default());
//!     let metrics = Arc::new(Metrics::new());
//!     let cancel = CancellationToken::new();
//!
//!     let _interrupt = sitefetch::install_interrupt_handler(config.grace_period, cancel.clone());
//!
//!     let source = Arc::new(FileSource::new("urls.txt"));
//!     let fetcher = Arc::new(HttpFetcher::new(&config, Arc::clone(&metrics))?);
//!     let sink = Arc::new(FileSink::new(config.output_dir.clone(), Arc::clone(&metrics)));
//!
//!     Pipeline::new(Arc::clone(&config))
//!         .run(source, fetcher, sink, cancel)
//!         .await;
//!     metrics.report();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Fetcher trait and the HTTP implementation
pub mod fetcher;
/// Passive run metrics
pub mod metrics;
/// The three-stage pipeline orchestrator
pub mod pipeline;
/// Interrupt handling and grace-period cancellation
pub mod shutdown;
/// Result sink trait and the file implementation
pub mod sink;
/// URL source trait and the file implementation
pub mod source;

pub use config::Config;
pub use error::{Error, FetchError, Result};
pub use fetcher::{FetchResult, Fetcher, HttpFetcher};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pipeline::Pipeline;
pub use shutdown::install_interrupt_handler;
pub use sink::{FileSink, ResultSink};
pub use source::{FileSource, UrlSource};
