//! The three-stage fetch pipeline and its shutdown protocol.
//!
//! Stage 1 (source) streams URL tokens into a bounded channel. Stage 2
//! (dispatch) drains that channel and, per URL, acquires one semaphore permit
//! and spawns a fetch task; results flow into a second bounded channel. Stage
//! 3 (sink) drains the result channel and persists each item.
//!
//! Shutdown ordering is the correctness core: the dispatch loop first stops
//! admitting (its URL channel is closed by the source), then drains every
//! in-flight fetch task through a `JoinSet`, and only then closes the result
//! channel. Closing earlier would truncate results; never closing would
//! deadlock the sink.

use crate::config::Config;
use crate::fetcher::{FetchResult, Fetcher};
use crate::sink::ResultSink;
use crate::source::UrlSource;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Orchestrates the source, the bounded fetch pool, and the sink
///
/// `run` blocks until all three stages have completed, whether the run ended
/// by input exhaustion or by cancellation.
pub struct Pipeline {
    config: Arc<Config>,
}

impl Pipeline {
    /// Create a pipeline with the given configuration.
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion.
    ///
    /// Stage errors are local: a failing source or sink logs its error and
    /// the remaining stages still wind down cleanly through the channel
    /// closes. Returns once every stage task has joined.
    pub async fn run(
        &self,
        source: Arc<dyn UrlSource>,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn ResultSink>,
        cancel: CancellationToken,
    ) {
        let capacity = self.config.max_concurrent_fetches;
        let (url_tx, url_rx) = mpsc::channel::<String>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<FetchResult>(capacity);
        let limiter = Arc::new(Semaphore::new(capacity));

        // Stage 1: stream URLs. Dropping `url_tx` inside the task closes the
        // URL channel, which is what ends the dispatch loop's admission phase.
        let source_task = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if let Err(e) = source.stream_urls(cancel, url_tx).await {
                    tracing::error!(error = %e, "url source failed");
                }
            }
        });

        // Stage 2: dispatch loop plus the fetch tasks it spawns.
        let dispatch_task = tokio::spawn(dispatch(
            url_rx,
            result_tx,
            limiter,
            fetcher,
            cancel.clone(),
        ));

        // Stage 3: drain and persist results until the channel closes.
        let sink_task = tokio::spawn(async move {
            if let Err(e) = sink.drain(cancel, result_rx).await {
                tracing::error!(error = %e, "result sink failed");
            }
        });

        // The run is complete only when all three stages have finished.
        let (source_done, dispatch_done, sink_done) =
            tokio::join!(source_task, dispatch_task, sink_task);
        for (stage, joined) in [
            ("source", source_done),
            ("dispatch", dispatch_done),
            ("sink", sink_done),
        ] {
            if let Err(e) = joined {
                tracing::error!(stage, error = %e, "pipeline stage panicked");
            }
        }
        tracing::debug!("pipeline complete: all stages finished");
    }
}

/// Stage 2: bridge the URL channel to a bounded set of fetch tasks.
///
/// Each admitted URL holds exactly one semaphore permit for the lifetime of
/// its fetch task; the owned permit moves into the task and is released on
/// drop, on every exit path including panic (the `JoinSet` reaps the task
/// either way).
async fn dispatch(
    mut url_rx: mpsc::Receiver<String>,
    result_tx: mpsc::Sender<FetchResult>,
    limiter: Arc<Semaphore>,
    fetcher: Arc<dyn Fetcher>,
    cancel: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    // Admission phase: ends when the source closes the URL channel, either on
    // input exhaustion or after observing cancellation. No separate
    // cancellation check is needed here.
    while let Some(url) = url_rx.recv().await {
        let permit = match Arc::clone(&limiter).acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed while the pipeline runs; treat a
            // close as shutdown anyway rather than panicking.
            Err(_) => break,
        };

        let fetcher = Arc::clone(&fetcher);
        let result_tx = result_tx.clone();
        let cancel = cancel.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            match fetcher.fetch(&cancel, &url).await {
                Ok(item) => {
                    if result_tx.send(item).await.is_err() {
                        tracing::warn!(
                            url = %url,
                            "result channel closed before item was delivered"
                        );
                    }
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(url = %url, "fetch abandoned during shutdown");
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "fetch failed");
                }
            }
        });
    }

    // Drain phase: every launched fetch task must finish before the result
    // channel closes.
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "fetch task panicked");
        }
    }

    // Close phase: the last sender drops here, signalling "no more results"
    // to the sink.
    drop(result_tx);
    tracing::debug!("dispatch finished: all fetch tasks drained, result channel closed");
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, Result};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Source that yields a fixed list of URLs.
    struct VecSource {
        urls: Vec<String>,
    }

    #[async_trait]
    impl UrlSource for VecSource {
        async fn stream_urls(
            &self,
            cancel: CancellationToken,
            urls: mpsc::Sender<String>,
        ) -> Result<()> {
            for url in &self.urls {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = urls.send(url.clone()) => {
                        if res.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(())
        }
    }

    /// Fetcher that tracks its own concurrency high-water mark.
    struct GaugeFetcher {
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl GaugeFetcher {
        fn new(delay: Duration) -> Self {
            Self {
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                delay,
            }
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for GaugeFetcher {
        async fn fetch(
            &self,
            cancel: &CancellationToken,
            url: &str,
        ) -> std::result::Result<FetchResult, FetchError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(FetchError::Cancelled {
                    url: url.to_string(),
                }),
                _ = tokio::time::sleep(self.delay) => Ok(FetchResult {
                    url: url.to_string(),
                    body: Bytes::from_static(b"payload"),
                }),
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    /// Sink that collects every drained item in memory.
    #[derive(Default)]
    struct CollectSink {
        items: Mutex<Vec<FetchResult>>,
    }

    #[async_trait]
    impl ResultSink for CollectSink {
        async fn drain(
            &self,
            _cancel: CancellationToken,
            mut results: mpsc::Receiver<FetchResult>,
        ) -> Result<()> {
            while let Some(item) = results.recv().await {
                self.items.lock().unwrap().push(item);
            }
            Ok(())
        }
    }

    fn pipeline_with_capacity(n: usize) -> Pipeline {
        let config = Config {
            max_concurrent_fetches: n,
            ..Default::default()
        };
        Pipeline::new(Arc::new(config))
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("http://t.test/{i}")).collect()
    }

    #[tokio::test]
    async fn three_urls_two_slots_all_reach_the_sink() {
        let fetcher = Arc::new(GaugeFetcher::new(Duration::from_millis(20)));
        let sink = Arc::new(CollectSink::default());

        pipeline_with_capacity(2)
            .run(
                Arc::new(VecSource { urls: urls(3) }),
                Arc::clone(&fetcher) as Arc<dyn Fetcher>,
                Arc::clone(&sink) as Arc<dyn ResultSink>,
                CancellationToken::new(),
            )
            .await;

        assert_eq!(sink.items.lock().unwrap().len(), 3);
        assert!(
            fetcher.peak() <= 2,
            "at most 2 fetches may run concurrently, saw {}",
            fetcher.peak()
        );
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_slot_budget() {
        let fetcher = Arc::new(GaugeFetcher::new(Duration::from_millis(10)));
        let sink = Arc::new(CollectSink::default());

        pipeline_with_capacity(5)
            .run(
                Arc::new(VecSource { urls: urls(40) }),
                Arc::clone(&fetcher) as Arc<dyn Fetcher>,
                Arc::clone(&sink) as Arc<dyn ResultSink>,
                CancellationToken::new(),
            )
            .await;

        assert_eq!(sink.items.lock().unwrap().len(), 40);
        assert!(fetcher.peak() <= 5, "peak was {}", fetcher.peak());
        assert!(fetcher.peak() >= 2, "pool should actually run in parallel");
    }

    #[tokio::test]
    async fn empty_input_completes_with_nothing_persisted() {
        let fetcher = Arc::new(GaugeFetcher::new(Duration::from_millis(1)));
        let sink = Arc::new(CollectSink::default());

        pipeline_with_capacity(4)
            .run(
                Arc::new(VecSource { urls: vec![] }),
                fetcher as Arc<dyn Fetcher>,
                Arc::clone(&sink) as Arc<dyn ResultSink>,
                CancellationToken::new(),
            )
            .await;

        assert!(sink.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_slot_serializes_every_fetch() {
        let fetcher = Arc::new(GaugeFetcher::new(Duration::from_millis(5)));
        let sink = Arc::new(CollectSink::default());

        pipeline_with_capacity(1)
            .run(
                Arc::new(VecSource { urls: urls(6) }),
                Arc::clone(&fetcher) as Arc<dyn Fetcher>,
                Arc::clone(&sink) as Arc<dyn ResultSink>,
                CancellationToken::new(),
            )
            .await;

        assert_eq!(fetcher.peak(), 1);
        assert_eq!(sink.items.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn cancellation_mid_run_still_terminates_cleanly() {
        let fetcher = Arc::new(GaugeFetcher::new(Duration::from_secs(60)));
        let sink = Arc::new(CollectSink::default());
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let pipeline = pipeline_with_capacity(2);
        let run = pipeline.run(
            Arc::new(VecSource { urls: urls(10) }),
            fetcher as Arc<dyn Fetcher>,
            Arc::clone(&sink) as Arc<dyn ResultSink>,
            cancel,
        );

        // The run must unwind within drain time, not wait out the 60s fetches.
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pipeline should terminate promptly after cancellation");

        assert!(sink.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_acquired_slot_is_released_after_cancellation() {
        let fetcher = Arc::new(GaugeFetcher::new(Duration::from_millis(200)));
        let sink = Arc::new(CollectSink::default());
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel_clone.cancel();
        });

        pipeline_with_capacity(3)
            .run(
                Arc::new(VecSource { urls: urls(20) }),
                Arc::clone(&fetcher) as Arc<dyn Fetcher>,
                Arc::clone(&sink) as Arc<dyn ResultSink>,
                cancel,
            )
            .await;

        // run() returning means the dispatch JoinSet fully drained, so every
        // permit moved into a fetch task has been dropped.
        assert_eq!(
            fetcher.active.load(Ordering::SeqCst),
            0,
            "no fetch may still be running after the pipeline completes"
        );
    }

    #[tokio::test]
    async fn a_failing_sink_does_not_hang_the_pipeline() {
        /// Sink that drops its receiver immediately.
        struct DeadSink;

        #[async_trait]
        impl ResultSink for DeadSink {
            async fn drain(
                &self,
                _cancel: CancellationToken,
                results: mpsc::Receiver<FetchResult>,
            ) -> Result<()> {
                drop(results);
                Ok(())
            }
        }

        let fetcher = Arc::new(GaugeFetcher::new(Duration::from_millis(1)));
        let pipeline = pipeline_with_capacity(2);
        let run = pipeline.run(
            Arc::new(VecSource { urls: urls(8) }),
            fetcher as Arc<dyn Fetcher>,
            Arc::new(DeadSink) as Arc<dyn ResultSink>,
            CancellationToken::new(),
        );

        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("pipeline must unwind when the sink abandons its channel");
    }
}
