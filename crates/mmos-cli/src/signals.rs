//! Ctrl+C / SIGTERM handling for `mmos serve`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

const INSTALL_TIMEOUT: Duration = Duration::from_secs(1);

/// Raise `stop` on the first Ctrl+C or SIGTERM. Returns once the handlers are in place.
pub fn stop_on_signal(stop: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("build signal runtime")?;
    let (installed_tx, installed_rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name("mmos-signals".to_string())
        .spawn(move || {
            runtime.block_on(wait_for_signal(installed_tx));
            tracing::info!("shutdown signal received");
            stop.store(true, Ordering::Release);
        })
        .context("spawn signal thread")?;

    if installed_rx.recv_timeout(INSTALL_TIMEOUT).is_err() {
        tracing::warn!("signal handlers not confirmed; continuing without them");
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal(installed: SyncSender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut interrupt, mut terminate) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(interrupt), Ok(terminate)) => (interrupt, terminate),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!("failed to install signal handlers: {err}");
                drop(installed);
                std::future::pending::<()>().await;
                return;
            }
        };
    let _ = installed.send(());

    tokio::select! {
        _ = interrupt.recv() => {},
        _ = terminate.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_signal(installed: SyncSender<()>) {
    let ctrl_c = tokio::signal::ctrl_c();
    let _ = installed.send(());
    if let Err(err) = ctrl_c.await {
        tracing::warn!("failed to listen for Ctrl+C: {err}");
        std::future::pending::<()>().await;
    }
}
