use super::error;
use super::output;
use super::{Commands, ConfigAction};
use crate::app::config::Config;
use crate::ipc::client::ControlClient;
use crate::ipc::protocol::{IpcRequest, IpcResponse};
use anyhow::Result;

/// Handle a client-side CLI command and return exit code.
///
/// `serve` is not handled here; the binary runs the daemon directly.
pub async fn handle_command(command: Commands, config: &Config) -> i32 {
    let result = match command {
        Commands::Serve => Err(anyhow::anyhow!("`serve` is handled by the daemon entry point")),
        Commands::Fetch { url } => handle_fetch(config, url).await,
        Commands::List { json } => handle_list(config, json).await,
        Commands::Status { id, json } => handle_status(config, id, json).await,
        Commands::Start { id, profile } => {
            handle_simple(config, IpcRequest::Start { id, profile }).await
        }
        Commands::Dest { id, name } => {
            handle_simple(
                config,
                IpcRequest::ChangeDestination {
                    id,
                    destination: name,
                },
            )
            .await
        }
        Commands::Stop { id } => handle_simple(config, IpcRequest::Stop { id }).await,
        Commands::Ping => handle_ping(config).await,
        Commands::Config { action } => handle_config(action, config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            error::ERROR
        }
    }
}

/// Exit code for an error response kind
pub fn exit_code_for(kind: &str) -> i32 {
    match kind {
        "not_found" => error::NOT_FOUND,
        "validation" | "invalid_state" => error::INVALID_INPUT,
        _ => error::ERROR,
    }
}

async fn request(config: &Config, request: IpcRequest) -> Result<IpcResponse> {
    let mut client = ControlClient::connect(config.server.port).await?;
    client.send(&request).await
}

/// Print an error or unexpected response and pick the exit code
fn report_failure(response: IpcResponse) -> i32 {
    match response {
        IpcResponse::Error { kind, message } => {
            eprintln!("Error: {}", message);
            exit_code_for(&kind)
        }
        other => {
            eprintln!("Error: unexpected response from daemon: {:?}", other);
            error::ERROR
        }
    }
}

async fn handle_fetch(config: &Config, url: String) -> Result<i32> {
    match request(config, IpcRequest::Fetch { url }).await? {
        IpcResponse::Created { download } => {
            println!("Added download #{}: {}", download.id, download.url);
            println!(
                "Choose a profile with: snare start {} <profile>  (available: {})",
                download.id,
                config
                    .profiles
                    .iter()
                    .map(|p| p.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            Ok(error::SUCCESS)
        }
        other => Ok(report_failure(other)),
    }
}

async fn handle_list(config: &Config, json: bool) -> Result<i32> {
    match request(config, IpcRequest::List).await? {
        IpcResponse::Downloads { downloads } => {
            println!("{}", output::format_downloads(&downloads, json));
            Ok(error::SUCCESS)
        }
        other => Ok(report_failure(other)),
    }
}

async fn handle_status(config: &Config, id: u64, json: bool) -> Result<i32> {
    match request(config, IpcRequest::Get { id }).await? {
        IpcResponse::Download { download } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&download)?);
            } else {
                print!("{}", output::format_download(&download, true));
            }
            Ok(error::SUCCESS)
        }
        other => Ok(report_failure(other)),
    }
}

/// Mutations that answer with `ok {message}`
async fn handle_simple(config: &Config, req: IpcRequest) -> Result<i32> {
    match request(config, req).await? {
        IpcResponse::Ok { message } => {
            println!("{}", message);
            Ok(error::SUCCESS)
        }
        other => Ok(report_failure(other)),
    }
}

async fn handle_ping(config: &Config) -> Result<i32> {
    match request(config, IpcRequest::Ping).await? {
        IpcResponse::Pong => {
            println!("snare daemon is running on port {}", config.server.port);
            Ok(error::SUCCESS)
        }
        other => Ok(report_failure(other)),
    }
}

fn handle_config(action: ConfigAction, config: &Config) -> Result<i32> {
    match action {
        ConfigAction::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("{}", toml::to_string_pretty(config)?);
            }
            Ok(error::SUCCESS)
        }
        ConfigAction::Path => {
            println!("{}", crate::util::paths::get_config_path()?.display());
            Ok(error::SUCCESS)
        }
    }
}
