use anyhow::Context;
use clap::Parser;
use ledgerd::server::{
    config::{CliArgs, ServerConfig},
    service::LedgerService,
    telemetry::{AUDIT_TARGET, init_telemetry},
};
use ledgerd_core::LedgerStore;
use std::{io, path::Path, sync::Arc};
use tokio::{net::UnixListener, signal};
use tokio_stream::wrappers::UnixListenerStream;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(&config.log_file)?;
    tracing::info!(target: AUDIT_TARGET, "Server started");

    let store = LedgerStore::open(&config.ledger_path)
        .with_context(|| format!("failed to open ledger {}", config.ledger_path.display()))?;

    remove_stale_socket(&config.socket_path)?;
    let listener = UnixListener::bind(&config.socket_path)
        .with_context(|| format!("failed to bind {}", config.socket_path.display()))?;
    log_startup_info(&config);

    let shutdown = CancellationToken::new();
    install_shutdown_signal(shutdown.clone())?;

    let service = LedgerService::new(&config, Arc::new(store), shutdown);
    service.serve(UnixListenerStream::new(listener)).await;

    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        tracing::warn!("Failed to remove {}: {e}", config.socket_path.display());
    }
    tracing::info!(target: AUDIT_TARGET, "Program exiting");
    Ok(())
}

fn remove_stale_socket(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove stale socket {}", path.display())),
    }
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Serving ledger on {} with full config: {:#?}",
            config.socket_path.display(),
            config
        );
    } else {
        tracing::info!(
            "Serving ledger on {} with {} workers",
            config.socket_path.display(),
            config.num_workers
        );
    }
}

/// Cancels `shutdown` on the first Ctrl+C or SIGTERM.
fn install_shutdown_signal(shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            result = signal::ctrl_c() => match result {
                Ok(()) => tracing::info!("Received Ctrl+C signal"),
                Err(e) => tracing::error!("Ctrl+C handler failed: {e}"),
            },
            _ = terminate.recv() => tracing::info!("Received SIGTERM signal"),
        }

        tracing::info!(target: AUDIT_TARGET, "Shutdown requested");
        shutdown.cancel();
    });

    Ok(())
}
