use clap::{Parser, Subcommand};

pub mod daemon;
pub mod error;
pub mod handler;
pub mod output;

/// snare - fetch media from the web with a bookmarklet and a downloader
#[derive(Parser, Debug)]
#[command(name = "snare")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override config directory path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<std::path::PathBuf>,

    /// Enable verbose logging (TRACE level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (runs the daemon when omitted)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the download daemon in the foreground
    Serve,

    /// Register a URL for download
    Fetch {
        /// URL to download
        url: String,
    },

    /// List all downloads
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show download status
    Status {
        /// Download ID
        id: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Choose a profile and queue a download
    Start {
        /// Download ID
        id: u64,

        /// Profile name from the config (e.g. "standard video")
        profile: String,
    },

    /// Set the destination of a download, or clear it when NAME is omitted
    Dest {
        /// Download ID
        id: u64,

        /// Destination name from the config
        name: Option<String>,
    },

    /// Stop a queued or running download
    Stop {
        /// Download ID
        id: u64,
    },

    /// Check that the daemon is reachable
    Ping,

    /// Manage configuration
    Config {
        /// Configuration action
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show all configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the config file location
    Path,
}
