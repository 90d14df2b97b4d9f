//! Vanguard Daemon - keyboard lighting mirror service.
//!
//! Keeps the Corsair Vanguard 96 showing the color of a selected source.
//! Color producers and the `vanguardctl` CLI talk to it over a Unix socket.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod runtime;
mod server;
mod signals;

use runtime::{MirrorRuntime, RuntimeCommand, RuntimeSettings};
use vanguard_core::{ColorSource, Command, MirrorSnapshot, SourceRegistry};
use vanguard_ipc::{
    ErrorData, ErrorInfo, Event, EventType, IpcServer, Response, SourcesChangedData, StatusChangedData,
    socket_path,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("vanguard_core=info".parse()?)
                .add_directive("vanguard_ipc=info".parse()?)
                .add_directive("vanguard_daemon=debug".parse()?)
                .add_directive("vanguard_hid=debug".parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Vanguard daemon");

    // Load configuration
    let config = config::load_config()?;
    info!("Configuration loaded");

    let registry = Arc::new(SourceRegistry::new());

    // Spawn mirror runtime
    let settings = RuntimeSettings {
        link: config.device.link_settings()?,
        tick_interval: config.mirror.tick_interval(),
        enabled: config.mirror.enabled,
        source: config.mirror.source(),
    };
    let (mirror_runtime, mut snapshot_rx) =
        MirrorRuntime::spawn(settings, Arc::clone(&registry))?;

    // Start IPC server
    let socket = config.daemon.socket_path.clone().unwrap_or_else(socket_path);
    let (ipc_server, mut request_rx) =
        IpcServer::bind(&socket).await.context("Failed to start IPC server")?;
    let event_tx = ipc_server.event_sender();

    // Spawn IPC server task
    let ipc_handle = tokio::spawn(async move {
        ipc_server.run().await;
    });

    // Set up signal handling
    let mut shutdown_rx = signals::setup_signal_handlers()?;

    let mut snapshot = MirrorSnapshot::default();

    info!("Daemon running. Press Ctrl+C to exit.");

    // Main event loop
    loop {
        tokio::select! {
            // Track mirror state
            Some(next) = snapshot_rx.recv() => {
                if next.status != snapshot.status {
                    info!("{}", next.status);
                }
                snapshot = next;

                let _ = event_tx.send(Event::new(
                    EventType::StatusChanged,
                    &StatusChangedData::from(&snapshot),
                ));
            }

            // Handle IPC requests
            Some((client_id, request, response_tx)) = request_rx.recv() => {
                debug!(client_id, request_id = request.id, "Handling IPC request");

                let handle_result = server::handle_request(&request.method, &snapshot, &registry);
                let mut shutdown = false;

                match handle_result.command {
                    Some(Command::SetEnabled { enabled }) => {
                        let command = RuntimeCommand::SetEnabled(enabled);
                        forward(&mirror_runtime, command, request.id, &response_tx, &event_tx)
                            .await;
                    }

                    Some(Command::SelectSource { source }) => {
                        let command = RuntimeCommand::SelectSource(source);
                        forward(&mirror_runtime, command, request.id, &response_tx, &event_tx)
                            .await;
                    }

                    Some(Command::UpdateSource { id, name, colors }) => {
                        let before = registry.list_sources();
                        if let Err(e) = registry.upsert(id, &name, colors) {
                            warn!(%id, error = %e, "Rejected source update");
                        } else if registry.list_sources() != before {
                            broadcast_sources(&event_tx, &registry);
                        }
                    }

                    Some(Command::RemoveSource { id }) => {
                        match registry.remove(id) {
                            Ok(info) => {
                                info!(%id, name = %info.name, "Source removed");
                                broadcast_sources(&event_tx, &registry);
                            }
                            Err(e) => warn!(%id, error = %e, "Failed to remove source"),
                        }
                    }

                    Some(Command::Shutdown) => {
                        info!("Shutdown command processed");
                        shutdown = true;
                    }

                    None => {}
                }

                if let Some(result) = handle_result.response {
                    let _ = response_tx.send(Response { id: request.id, result }).await;
                }
                if shutdown {
                    break;
                }
            }

            // Handle shutdown signal
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    // The runtime must not block on a full snapshot channel while we join it.
    drop(snapshot_rx);
    mirror_runtime.shutdown();
    ipc_handle.abort();

    if let Err(e) = std::fs::remove_file(&socket) {
        debug!(error = %e, "Failed to remove socket file");
    }

    info!("Vanguard daemon stopped");
    Ok(())
}

/// Hand a command to the mirror thread and answer once it took effect.
async fn forward(
    runtime: &MirrorRuntime,
    command: RuntimeCommand,
    request_id: u64,
    response_tx: &mpsc::Sender<Response>,
    event_tx: &broadcast::Sender<Event>,
) {
    match runtime.apply(command) {
        Ok(applied) => {
            tokio::spawn(server::reply_when_applied(request_id, applied, response_tx.clone()));
        }
        Err(e) => {
            error!(error = %e, ?command, "Failed to reach mirror runtime");
            let result = Err(ErrorInfo::new(503, e.to_string()));
            let _ = response_tx.send(Response { id: request_id, result }).await;
            let _ = event_tx.send(Event::new(
                EventType::Error,
                &ErrorData { code: 500, message: e.to_string(), source: "runtime".into() },
            ));
        }
    }
}

fn broadcast_sources(
    event_tx: &broadcast::Sender<Event>,
    registry: &SourceRegistry,
) {
    let data = SourcesChangedData { sources: registry.list_sources() };
    let _ = event_tx.send(Event::new(EventType::SourcesChanged, &data));
}
