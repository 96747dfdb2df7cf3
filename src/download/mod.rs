pub mod admission;
pub mod error;
pub mod manager;
pub mod progress;
pub mod relocate;
pub mod runner;
pub mod task;

pub use error::ManagerError;
pub use manager::{DownloadManager, StopOutcome, TickReport};
pub use task::{DownloadSnapshot, DownloadState};
