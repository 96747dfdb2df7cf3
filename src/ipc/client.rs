/// Client side of the control protocol, used by the CLI subcommands.
use super::protocol::{IpcRequest, IpcResponse, CONTROL_HOST};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Timeout for connecting and for each request/response round trip
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One connection to a running daemon
pub struct ControlClient {
    reader: tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl ControlClient {
    /// Connect to the daemon on the local control port
    pub async fn connect(port: u16) -> Result<Self> {
        let addr = format!("{}:{}", CONTROL_HOST, port);
        Self::connect_to(&addr).await
    }

    pub async fn connect_to(addr: &str) -> Result<Self> {
        let stream = tokio::time::timeout(REQUEST_TIMEOUT, TcpStream::connect(addr))
            .await
            .context(format!("Timed out connecting to snare daemon at {}", addr))?
            .context(format!(
                "Could not connect to snare daemon at {} (is `snare serve` running?)",
                addr
            ))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Send one request and wait for its response line
    pub async fn send(&mut self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        tracing::trace!("Sending control request: {}", line.trim_end());
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to send request to daemon")?;

        let reply = tokio::time::timeout(REQUEST_TIMEOUT, self.reader.next_line())
            .await
            .context("Timed out waiting for daemon response")?
            .context("Failed to read daemon response")?
            .ok_or_else(|| anyhow::anyhow!("Daemon closed the connection"))?;

        serde_json::from_str(&reply).context(format!("Malformed daemon response: {}", reply))
    }
}
