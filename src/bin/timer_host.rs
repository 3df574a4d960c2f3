//! Standalone background timer host.
//!
//! Reads `PendingFireBatch` messages as newline-delimited JSON from stdin
//! and fires them through a logging notifier. When stdin closes, armed
//! timers keep running until Ctrl-C.
//!
//! All tracing output goes to stderr.

use nudge::background::stdio::serve_batches;
use nudge::delivery::TracingNotifier;
use nudge::{BackgroundTimerHost, HostConfig, SystemClock};
use std::sync::Arc;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nudge=info")),
        )
        .init();

    tracing::info!("nudge-timer-host starting");

    let (handle, task) = BackgroundTimerHost::spawn(
        Arc::new(TracingNotifier::default()),
        Arc::new(SystemClock),
        HostConfig::default(),
    );

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        served = serve_batches(stdin, &handle) => {
            served.map_err(|e| {
                tracing::error!(error = %e, "nudge-timer-host input failed");
                anyhow::anyhow!("nudge-timer-host failed: {e}")
            })?;
            tokio::signal::ctrl_c().await?;
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    handle.shutdown();
    task.await?;
    tracing::info!("nudge-timer-host shut down cleanly");
    Ok(())
}
