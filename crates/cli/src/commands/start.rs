//! Long-running scheduler command.

use std::path::Path;

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use wheel_trade_engine::{Scheduler, ShutdownHandle};

use crate::runtime::Runtime;

/// Runs the scheduler until SIGINT or SIGTERM.
///
/// # Errors
/// Returns an error if configuration is invalid or signal handlers cannot be installed.
pub async fn run_start(config: Option<&Path>) -> Result<()> {
    let runtime = Runtime::load(config)?;
    if runtime.config.enabled_symbols().next().is_none() {
        tracing::warn!("no enabled symbols configured, scheduler will idle");
    }

    let engine = runtime.engine()?;
    let scheduler = Scheduler::new(engine, ShutdownHandle::new())?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let handle = scheduler.shutdown_handle();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, finishing current tick before shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT (Ctrl+C), finishing current tick before shutdown");
            }
        }
        handle.trigger();
    });

    scheduler.run().await;
    tracing::info!("wheel scheduler stopped");
    Ok(())
}
