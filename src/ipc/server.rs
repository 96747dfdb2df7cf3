/// TCP control server exposing the download manager.
///
/// Listens on `127.0.0.1:<server.port>`. Each client connection is handled in
/// a separate tokio task and may send any number of requests.
use super::protocol::{IpcRequest, IpcResponse};
use crate::download::manager::DownloadManager;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// Bind the control socket and start accepting clients.
///
/// Returns `(bound_address, join_handle)` so the caller can report the address
/// (useful with port 0) and abort the server on shutdown.
pub async fn start_control_server(
    manager: DownloadManager,
    addr: SocketAddr,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind control socket on {}", addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Control server listening on {}", local_addr);

    let handle = tokio::spawn(async move {
        accept_loop(listener, manager).await;
    });

    Ok((local_addr, handle))
}

async fn accept_loop(listener: TcpListener, manager: DownloadManager) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("Failed to accept control connection: {}", e);
                // Brief pause before retrying to avoid busy-loop on persistent errors
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                continue;
            }
        };

        tracing::debug!("Control client connected from {}", peer);

        let manager = manager.clone();
        tokio::spawn(async move {
            handle_client(stream, manager).await;
            tracing::debug!("Control client {} disconnected", peer);
        });
    }
}

/// Read newline-delimited JSON requests and write one response line each
async fn handle_client(stream: TcpStream, manager: DownloadManager) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<IpcRequest>(line) {
            Ok(request) => process_request(request, &manager).await,
            Err(e) => {
                tracing::warn!("Invalid control message: {} (raw: {})", e, line);
                IpcResponse::error("validation", format!("Invalid message: {}", e))
            }
        };

        let mut resp_json = match serde_json::to_string(&response) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!("Failed to serialize control response: {}", e);
                continue;
            }
        };
        resp_json.push('\n');

        if let Err(e) = writer.write_all(resp_json.as_bytes()).await {
            tracing::warn!("Failed to write control response: {}", e);
            break;
        }
    }
}

/// Map one request onto the manager
pub async fn process_request(request: IpcRequest, manager: &DownloadManager) -> IpcResponse {
    match request {
        IpcRequest::Fetch { url } => match manager.add_download(&url).await {
            Ok(download) => IpcResponse::Created { download },
            Err(e) => e.into(),
        },
        IpcRequest::List => IpcResponse::Downloads {
            downloads: manager.snapshot().await,
        },
        IpcRequest::Get { id } => match manager.get_by_id(id).await {
            Ok(download) => IpcResponse::Download { download },
            Err(e) => e.into(),
        },
        IpcRequest::Start { id, profile } => {
            match manager.set_profile_and_queue(id, &profile).await {
                Ok(()) => IpcResponse::ok(format!("Download #{} queued with '{}'", id, profile)),
                Err(e) => e.into(),
            }
        }
        IpcRequest::ChangeDestination { id, destination } => {
            match manager.change_destination(id, destination.as_deref()).await {
                Ok(()) => IpcResponse::ok(match destination {
                    Some(name) => format!("Destination of #{} set to '{}'", id, name),
                    None => format!("Destination of #{} cleared", id),
                }),
                Err(e) => e.into(),
            }
        }
        IpcRequest::Stop { id } => match manager.stop(id).await {
            Ok(outcome) => IpcResponse::ok(outcome.message()),
            Err(e) => e.into(),
        },
        IpcRequest::Ping => IpcResponse::Pong,
    }
}
