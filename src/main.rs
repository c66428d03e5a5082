use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use save_rewind::backup::restore::restore_backup;
use save_rewind::backup::BackupService;
use save_rewind::utils;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::logging::init_tracing();

    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        if command == "restore" {
            let (Some(backup), Some(destination)) = (args.next(), args.next()) else {
                bail!("usage: save-rewind restore <backup-file> <destination>");
            };
            restore_backup(Path::new(&backup), Path::new(&destination)).await?;
            return Ok(());
        }
        bail!("unknown command: {command}");
    }

    let config = utils::config::load_config()?;
    info!("Starting save-rewind");
    info!(
        "Watching '{}' -> '{}' (retention: {}, compress: {})",
        config.saves_folder.display(),
        config.backup_folder.display(),
        config.retention_count,
        config.compress
    );

    let service = Arc::new(BackupService::new(config));

    // Observer side of the event channel: drained here on its own
    // schedule, independent of the worker.
    let mut events = service.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => info!(target: "events", "{line}"),
                    Err(error) => warn!("unserializable event: {error}"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("event observer lagged; skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    service.start_monitoring().await;
    shutdown_signal().await;
    service.stop_monitoring().await;

    info!("Stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
