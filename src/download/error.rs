use super::relocate::RelocateError;
use super::task::DownloadState;
use thiserror::Error;

/// Failures returned to the caller of a manager operation.
///
/// Admission refusals are not errors: the scheduler simply retries on the
/// next tick. Downloader failures are stored on the download itself.
#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Download #{0} not found")]
    NotFound(u64),

    #[error("Cannot {action} download #{id} while it is {state}")]
    InvalidState {
        id: u64,
        state: DownloadState,
        action: &'static str,
    },

    #[error("{0}")]
    Validation(String),

    /// The destination was stored but the file move failed
    #[error("Destination changed, but moving files failed: {0}")]
    Relocate(#[from] RelocateError),

    #[error("Failed to serialize downloads: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ManagerError {
    /// Stable machine-readable kind for protocol responses
    pub fn kind(&self) -> &'static str {
        match self {
            ManagerError::NotFound(_) => "not_found",
            ManagerError::InvalidState { .. } => "invalid_state",
            ManagerError::Validation(_) => "validation",
            ManagerError::Relocate(_) => "relocate",
            ManagerError::Serialization(_) => "internal",
        }
    }
}
