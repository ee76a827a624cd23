//! Interrupt handling and the grace-period cancellation protocol.
//!
//! The token moves through three states: active, grace period pending (first
//! interrupt received, timer running), cancelled (timer elapsed). There are
//! no reverse transitions, and a second interrupt during the grace period is
//! deliberately ignored — the handler task is already past its signal wait.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Install the interrupt handler for the pipeline run.
///
/// Spawns a task that waits for the first SIGINT/SIGTERM (Ctrl+C elsewhere),
/// logs a warning, sleeps out the grace period, and then fires `cancel`.
/// In-flight work keeps making progress for the whole grace period.
pub fn install_interrupt_handler(grace: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        grace_then_cancel(grace, cancel).await;
    })
}

/// Log the shutdown intent, wait out the grace period, cancel the token.
pub(crate) async fn grace_then_cancel(grace: Duration, cancel: CancellationToken) {
    tracing::warn!(
        grace_secs = grace.as_secs(),
        "interrupt received, gracefully shutting down after grace period"
    );
    tokio::time::sleep(grace).await;
    cancel.cancel();
    tracing::info!("grace period elapsed, cancellation signalled to all stages");
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration can fail in restricted environments (containers,
    // tests); fall back to whichever handler could be installed.
    let sigterm = signal(SignalKind::terminate());
    let sigint = signal(SignalKind::interrupt());

    match (sigterm, sigint) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(
                error = %e,
                "could not register SIGINT handler, waiting for SIGTERM only"
            );
            sigterm.recv().await;
            tracing::info!("received SIGTERM");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(
                error = %e,
                "could not register SIGTERM handler, waiting for SIGINT only"
            );
            sigint.recv().await;
            tracing::info!("received SIGINT (Ctrl+C)");
        }
        (Err(_), Err(_)) => {
            tracing::error!("could not register unix signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
