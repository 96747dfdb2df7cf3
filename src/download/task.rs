use super::progress::ProgressUpdate;
use super::runner::RunControl;
use crate::app::config::{Destination, DownloadProfile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Most recent output lines kept per download
pub const MAX_LOG_LINES: usize = 1000;

/// Log entry for download events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Log level for entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self::with_level(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::with_level(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(LogLevel::Error, message)
    }

    fn with_level(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// Lifecycle state of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Queued,
    Running,
    Complete,
    Error,
    Stopped,
}

impl DownloadState {
    /// Complete, Error and Stopped accept no further lifecycle transition
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadState::Complete | DownloadState::Error | DownloadState::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DownloadState::Queued => "queued",
            DownloadState::Running => "running",
            DownloadState::Complete => "complete",
            DownloadState::Error => "error",
            DownloadState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested fetch, owned by the manager's registry.
///
/// Only the manager mutates a `Download`, always while holding its guard.
/// Everything handed out to other components is a [`DownloadSnapshot`].
#[derive(Debug)]
pub struct Download {
    id: u64,
    url: String,
    domain: String,
    state: DownloadState,
    profile: Option<DownloadProfile>,
    destination: Option<Destination>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    stop_requested: bool,
    percent: Option<f32>,
    eta: Option<String>,
    playlist_current: Option<u32>,
    playlist_total: Option<u32>,
    files: Vec<PathBuf>,
    error_message: Option<String>,
    logs: Vec<LogEntry>,
    process: Option<RunControl>,
}

impl Download {
    pub(crate) fn new(id: u64, url: String, domain: String) -> Self {
        let mut download = Self {
            id,
            url,
            domain,
            state: DownloadState::Queued,
            profile: None,
            destination: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            stop_requested: false,
            percent: None,
            eta: None,
            playlist_current: None,
            playlist_total: None,
            files: Vec::new(),
            error_message: None,
            logs: Vec::new(),
            process: None,
        };
        download.log(LogEntry::info("Download created"));
        download
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn profile(&self) -> Option<&DownloadProfile> {
        self.profile.as_ref()
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Queued with a profile chosen
    pub fn is_startable(&self) -> bool {
        self.state == DownloadState::Queued && self.profile.is_some()
    }

    pub(crate) fn log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        if self.logs.len() > MAX_LOG_LINES {
            let excess = self.logs.len() - MAX_LOG_LINES;
            self.logs.drain(..excess);
        }
    }

    pub(crate) fn set_profile(&mut self, profile: DownloadProfile) {
        self.log(LogEntry::info(format!("Profile set to '{}'", profile.name)));
        self.profile = Some(profile);
    }

    pub(crate) fn set_destination(&mut self, destination: Option<Destination>) {
        let label = destination
            .as_ref()
            .map(|d| d.name.clone())
            .unwrap_or_else(|| "don't move".to_string());
        self.log(LogEntry::info(format!("Destination set to '{}'", label)));
        self.destination = destination;
    }

    pub(crate) fn replace_files(&mut self, files: Vec<PathBuf>) {
        self.files = files;
    }

    /// Point recorded files at their new location. Entries that no longer
    /// match a `from` path are left as they are.
    pub(crate) fn record_moves(&mut self, moved: &[(PathBuf, PathBuf)]) {
        for file in &mut self.files {
            if let Some((_, to)) = moved.iter().find(|(from, _)| from == file) {
                *file = to.clone();
            }
        }
    }

    /// Queued -> Running. The caller holds the domain slot.
    pub(crate) fn mark_running(&mut self, control: RunControl) {
        debug_assert_eq!(self.state, DownloadState::Queued);
        self.state = DownloadState::Running;
        self.started_at.get_or_insert_with(Utc::now);
        self.process = Some(control);
        self.log(LogEntry::info("Download started"));
    }

    /// Queued -> Stopped, no process involved
    pub(crate) fn mark_stopped_before_start(&mut self) {
        debug_assert_eq!(self.state, DownloadState::Queued);
        self.state = DownloadState::Stopped;
        self.finished_at.get_or_insert_with(Utc::now);
        self.log(LogEntry::info("Download stopped before starting"));
    }

    /// Record a stop request and signal the process. The state stays
    /// Running until the runner reports termination.
    pub(crate) fn request_stop(&mut self) {
        self.stop_requested = true;
        if let Some(control) = self.process.as_mut() {
            control.request_stop();
        }
        self.log(LogEntry::warn("Stop requested"));
    }

    /// Running -> terminal. Drops the process handle. Returns false (and
    /// changes nothing) when the download is not Running.
    pub(crate) fn finish(&mut self, state: DownloadState, message: Option<String>) -> bool {
        if self.state != DownloadState::Running || !state.is_terminal() {
            return false;
        }
        self.state = state;
        self.process = None;
        self.finished_at.get_or_insert_with(Utc::now);
        self.eta = None;
        match state {
            DownloadState::Complete => {
                self.percent = Some(100.0);
                self.log(LogEntry::info("Download complete"));
            }
            DownloadState::Stopped => {
                self.log(LogEntry::warn("Download stopped"));
            }
            _ => {
                let text = message.clone().unwrap_or_else(|| "unknown failure".to_string());
                self.log(LogEntry::error(format!("Download failed: {}", text)));
            }
        }
        if state == DownloadState::Error {
            self.error_message = message;
        }
        true
    }

    /// Queued -> Error when the runner could not even be started
    pub(crate) fn fail_to_start(&mut self, message: String) {
        debug_assert_eq!(self.state, DownloadState::Queued);
        self.state = DownloadState::Error;
        self.finished_at.get_or_insert_with(Utc::now);
        self.log(LogEntry::error(format!("Could not start downloader: {}", message)));
        self.error_message = Some(message);
    }

    pub(crate) fn apply_progress(&mut self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Percent { percent, eta } => {
                self.percent = Some(percent);
                if eta.is_some() {
                    self.eta = eta;
                }
            }
            ProgressUpdate::File { path } => {
                if !self.files.contains(&path) {
                    self.files.push(path);
                }
            }
            ProgressUpdate::AlreadyDownloaded { path } => {
                self.percent = Some(100.0);
                if !self.files.contains(&path) {
                    self.files.push(path);
                }
            }
            ProgressUpdate::Merged { path } => {
                self.files = vec![path];
            }
            ProgressUpdate::Playlist { current, total } => {
                self.playlist_current = Some(current);
                self.playlist_total = Some(total);
            }
        }
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        DownloadSnapshot::from(self)
    }
}

/// Point-in-time, serialisable view of a [`Download`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadSnapshot {
    pub id: u64,
    pub url: String,
    pub domain: String,
    pub state: DownloadState,
    pub profile: Option<DownloadProfile>,
    pub destination: Option<Destination>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stop_requested: bool,
    pub percent: Option<f32>,
    pub eta: Option<String>,
    pub playlist_current: Option<u32>,
    pub playlist_total: Option<u32>,
    pub files: Vec<PathBuf>,
    pub error_message: Option<String>,
    pub logs: Vec<LogEntry>,
    /// True while the state allows a stop request
    pub can_stop: bool,
}

impl From<&Download> for DownloadSnapshot {
    fn from(download: &Download) -> Self {
        Self {
            id: download.id,
            url: download.url.clone(),
            domain: download.domain.clone(),
            state: download.state,
            profile: download.profile.clone(),
            destination: download.destination.clone(),
            created_at: download.created_at,
            started_at: download.started_at,
            finished_at: download.finished_at,
            stop_requested: download.stop_requested,
            percent: download.percent,
            eta: download.eta.clone(),
            playlist_current: download.playlist_current,
            playlist_total: download.playlist_total,
            files: download.files.clone(),
            error_message: download.error_message.clone(),
            logs: download.logs.clone(),
            can_stop: !download.state.is_terminal(),
        }
    }
}
