/// Control protocol between the snare daemon and its clients (the CLI and
/// any popup/HTTP front end).
///
/// Wire format: each message is a single JSON line terminated by `\n`.
use crate::download::task::DownloadSnapshot;
use crate::download::ManagerError;
use serde::{Deserialize, Serialize};

/// Host the control server binds to
pub const CONTROL_HOST: &str = "127.0.0.1";

/// Request sent from a client to the daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    /// Register a new download
    #[serde(rename = "fetch")]
    Fetch { url: String },

    /// All downloads
    #[serde(rename = "list")]
    List,

    /// One download by id
    #[serde(rename = "get")]
    Get { id: u64 },

    /// Choose a profile and queue the download
    #[serde(rename = "start")]
    Start { id: u64, profile: String },

    /// Set or clear the destination; `None` means don't move
    #[serde(rename = "change_destination")]
    ChangeDestination {
        id: u64,
        #[serde(default)]
        destination: Option<String>,
    },

    #[serde(rename = "stop")]
    Stop { id: u64 },

    /// Connection health check
    #[serde(rename = "ping")]
    Ping,
}

/// Response sent from the daemon to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Mutation accepted
    #[serde(rename = "ok")]
    Ok { message: String },

    /// A download was registered
    #[serde(rename = "created")]
    Created { download: DownloadSnapshot },

    #[serde(rename = "download")]
    Download { download: DownloadSnapshot },

    #[serde(rename = "downloads")]
    Downloads { downloads: Vec<DownloadSnapshot> },

    /// Request was rejected or an error occurred
    #[serde(rename = "error")]
    Error { kind: String, message: String },

    /// Pong reply to a ping request
    #[serde(rename = "pong")]
    Pong,
}

impl IpcResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        IpcResponse::Ok {
            message: message.into(),
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        IpcResponse::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<ManagerError> for IpcResponse {
    fn from(err: ManagerError) -> Self {
        IpcResponse::error(err.kind(), err.to_string())
    }
}
