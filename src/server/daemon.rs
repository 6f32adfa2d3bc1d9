//! Daemon run loop
//!
//! Starts the poll loop, reloads from the database so edits made by other
//! `cadence` invocations are picked up, and flushes state on shutdown.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::build_engine;
use super::config::AppConfig;

/// Run the scheduler until Ctrl-C or SIGTERM
pub async fn run(config: AppConfig) -> Result<()> {
    info!("Starting Cadence daemon v{}", env!("CARGO_PKG_VERSION"));

    let engine = Arc::new(build_engine(&config, true).await?);
    engine.start().await;

    let mut reload = tokio::time::interval(Duration::from_secs(
        config.scheduler.sync_interval_secs.max(1),
    ));
    // first tick fires immediately and the engine has just loaded
    reload.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = reload.tick() => {
                match engine.load().await {
                    Ok(count) => debug!(count, "Reloaded tasks"),
                    Err(e) => warn!("Failed to reload tasks: {}", e),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    engine.stop().await;
    // pick up edits made since the last reload before writing back
    if let Err(e) = engine.load().await {
        warn!("Failed to reload tasks before shutdown: {}", e);
    }
    if let Err(e) = engine.sync().await {
        warn!("Final sync incomplete: {}", e);
    }
    info!("Cadence daemon stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
