//! Command-line entry point for sitefetch.

use clap::Parser;
use sitefetch::{
    Config, Error, FileSink, FileSource, HttpFetcher, Metrics, Pipeline, Result,
    install_interrupt_handler,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Fetch a list of URLs concurrently and save each response to disk.
#[derive(Debug, Parser)]
#[command(name = "sitefetch")]
#[command(about = "Fetch a list of URLs concurrently and save each response", long_about = None)]
struct Cli {
    /// Path to a file containing one URL per line.
    input: PathBuf,

    /// Maximum number of concurrent fetches.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Directory where fetched responses are written.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sitefetch=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    // A missing positional argument never reaches the pipeline: clap exits
    // non-zero with a usage error here.
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::default();
    if let Some(n) = cli.concurrency {
        config.max_concurrent_fetches = n;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    config.validate()?;

    // Startup check: the input must be readable before any stage launches.
    tokio::fs::metadata(&cli.input)
        .await
        .map_err(|e| Error::InputUnreadable {
            path: cli.input.display().to_string(),
            source: e,
        })?;

    let config = Arc::new(config);
    let metrics = Arc::new(Metrics::new());
    let cancel = CancellationToken::new();

    // First interrupt starts the grace timer; the handler task outlives the
    // run only if no signal ever arrives, and is dropped with the runtime.
    let _interrupt = install_interrupt_handler(config.grace_period, cancel.clone());

    let source = Arc::new(FileSource::new(cli.input));
    let fetcher = Arc::new(HttpFetcher::new(&config, Arc::clone(&metrics))?);
    let sink = Arc::new(FileSink::new(
        config.output_dir.clone(),
        Arc::clone(&metrics),
    ));

    tracing::info!(
        concurrency = config.max_concurrent_fetches,
        output_dir = %config.output_dir.display(),
        "starting fetch pipeline"
    );

    Pipeline::new(Arc::clone(&config))
        .run(source, fetcher, sink, cancel)
        .await;

    // Reported unconditionally, however many items failed or were dropped.
    metrics.report();
    Ok(())
}
