//! Signal handling for graceful shutdown.

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Set up signal handlers for graceful shutdown.
///
/// Returns a receiver that gets a message on the first SIGTERM or SIGINT.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<()>> {
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let interrupted = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received SIGINT"),
                Err(e) => {
                    // SIGTERM still works.
                    error!(error = %e, "Failed to listen for SIGINT");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = terminate.recv() => info!("Received SIGTERM"),
            () = interrupted => {}
        }
        let _ = tx.send(()).await;
    });

    Ok(rx)
}
