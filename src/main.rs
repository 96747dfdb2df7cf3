use anyhow::Result;
use clap::Parser;
use snare::{
    app::config::Config,
    cli::{self, Cli, Commands},
};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first to get verbose flag
    let cli = Cli::parse();

    // Set config directory override before anything resolves paths
    if let Some(ref config_dir) = cli.config {
        snare::util::paths::set_config_dir_override(Some(config_dir.clone()));
    }

    // Get logs directory (creates if needed)
    let logs_dir = snare::util::paths::get_logs_dir().unwrap_or_else(|_| PathBuf::from("."));
    std::fs::create_dir_all(&logs_dir).ok();

    // Set up daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "snare.jsonl");
    let (non_blocking, log_guard) = tracing_appender::non_blocking(file_appender);

    // Set log level based on verbose flag
    let log_level = if cli.verbose {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    let daemon_mode = matches!(cli.command, None | Some(Commands::Serve));

    // JSON for the log file, human-readable stderr only when serving or verbose
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                    log_level,
                )),
        )
        .with(
            (daemon_mode || cli.verbose).then(|| {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                        log_level,
                    ))
            }),
        )
        .init();

    tracing::info!("Starting snare...");
    if cli.verbose {
        tracing::info!("Verbose logging enabled (TRACE level)");
    }
    tracing::trace!("CLI arguments: {:?}", cli);
    if let Some(ref config_dir) = cli.config {
        tracing::info!("Using config directory override: {:?}", config_dir);
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(cli::error::ERROR);
        }
    };
    tracing::debug!("Config loaded: {:?}", config);

    // Route based on CLI arguments
    match cli.command {
        None | Some(Commands::Serve) => {
            cli::daemon::run_daemon(config).await?;
        }
        Some(command) => {
            // Client mode - talk to the daemon and exit
            let exit_code = cli::handler::handle_command(command, &config).await;
            drop(log_guard);
            std::process::exit(exit_code);
        }
    }

    Ok(())
}
