use crate::app::config::Config;
use crate::download::manager::DownloadManager;
use crate::download::DownloadState;
use crate::download::runner::CommandRunner;
use crate::ipc::protocol::CONTROL_HOST;
use crate::ipc::server::start_control_server;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

/// Run the download daemon until Ctrl+C
pub async fn run_daemon(config: Config) -> Result<()> {
    tracing::info!("Starting daemon mode...");

    std::fs::create_dir_all(&config.server.download_path).context(format!(
        "Failed to create download directory {:?}",
        config.server.download_path
    ))?;
    tracing::info!("Downloading into {:?}", config.server.download_path);

    let addr: SocketAddr = format!("{}:{}", CONTROL_HOST, config.server.port)
        .parse()
        .context("Invalid control address")?;

    let manager = DownloadManager::new(Arc::new(config), Arc::new(CommandRunner::new()));

    let queue_handle = manager.spawn_queue_loop();
    let (bound, server_handle) = start_control_server(manager.clone(), addr).await?;

    println!("snare listening on {} - press Ctrl+C to stop", bound);
    tracing::info!("Press Ctrl+C to stop");

    // Wait for Ctrl+C
    match signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        Err(e) => {
            tracing::error!("Error waiting for Ctrl+C: {}", e);
        }
    }

    server_handle.abort();
    queue_handle.abort();

    let running = manager
        .snapshot()
        .await
        .into_iter()
        .filter(|d| d.state == DownloadState::Running)
        .count();
    if running > 0 {
        tracing::warn!("{} downloads still running will be killed on exit", running);
    }

    tracing::info!("Daemon stopped");

    Ok(())
}
