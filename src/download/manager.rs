use super::admission::{extract_domain, DomainAdmission};
use super::error::ManagerError;
use super::progress::{self, ProgressUpdate};
use super::relocate::{relocate_files, RelocateError};
use super::runner::{ProcessRunner, RunEvent, RunOutcome, RunRequest};
use super::task::{Download, DownloadSnapshot, DownloadState, LogEntry};
use crate::app::config::{Config, Destination};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Everything behind the manager's single guard.
///
/// The registry and the admission counts share one lock so that checking a
/// domain's slot and starting a download commit together.
struct Registry {
    /// Creation order, which is also ascending id order
    downloads: Vec<Download>,
    admission: DomainAdmission,
    next_id: u64,
    /// One lock per download whose files are being moved
    moves: HashMap<u64, Arc<Mutex<()>>>,
}

impl Registry {
    fn position(&self, id: u64) -> Option<usize> {
        self.downloads.binary_search_by_key(&id, |d| d.id()).ok()
    }

    fn get(&self, id: u64) -> Result<&Download, ManagerError> {
        self.position(id)
            .map(|pos| &self.downloads[pos])
            .ok_or(ManagerError::NotFound(id))
    }

    fn move_lock(&mut self, id: u64) -> Arc<Mutex<()>> {
        self.moves.entry(id).or_default().clone()
    }

    fn get_mut(&mut self, id: u64) -> Result<&mut Download, ManagerError> {
        match self.position(id) {
            Some(pos) => Ok(&mut self.downloads[pos]),
            None => Err(ManagerError::NotFound(id)),
        }
    }

    /// Drop terminal downloads that finished at least `retention` ago
    fn prune_finished(&mut self, now: DateTime<Utc>, retention: chrono::Duration) -> usize {
        let before = self.downloads.len();
        self.downloads.retain(|d| {
            let expired = d.state().is_terminal()
                && d.finished_at().is_some_and(|at| now - at >= retention);
            !expired
        });
        let downloads = &self.downloads;
        self.moves
            .retain(|id, _| downloads.binary_search_by_key(id, |d| d.id()).is_ok());
        before - self.downloads.len()
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The download had not started and is now stopped
    Stopped,
    /// The process was signalled; the state changes once it exits
    StopRequested,
}

impl StopOutcome {
    pub fn message(self) -> &'static str {
        match self {
            StopOutcome::Stopped => "download stopped",
            StopOutcome::StopRequested => "stop requested",
        }
    }
}

/// What one scheduling pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub started: Vec<u64>,
    pub failed_to_start: Vec<u64>,
    pub pruned: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.started.is_empty() && self.failed_to_start.is_empty() && self.pruned == 0
    }
}

#[derive(Clone)]
pub struct DownloadManager {
    registry: Arc<Mutex<Registry>>,
    config: Arc<Config>,
    runner: Arc<dyn ProcessRunner>,
}

impl DownloadManager {
    pub fn new(config: Arc<Config>, runner: Arc<dyn ProcessRunner>) -> Self {
        let admission = DomainAdmission::new(config.server.maximum_active_downloads);
        tracing::info!(
            "Download manager ready: {} per domain, finished downloads kept {}s",
            admission.max_per_domain(),
            config.server.finished_retention_secs
        );
        Self {
            registry: Arc::new(Mutex::new(Registry {
                downloads: Vec::new(),
                admission,
                next_id: 1,
                moves: HashMap::new(),
            })),
            config,
            runner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue_interval(&self) -> Duration {
        Duration::from_millis(self.config.server.queue_interval_ms.max(1))
    }

    fn retention(&self) -> chrono::Duration {
        i64::try_from(self.config.server.finished_retention_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    // ========== Registry Operations ==========

    /// Validate `url` and register it as a new queued download.
    ///
    /// Admission is not checked here; that happens when the scheduler runs.
    pub async fn add_download(&self, url: &str) -> Result<DownloadSnapshot, ManagerError> {
        let url = url.trim();
        let domain = self.validate_url(url)?;

        let mut registry = self.registry.lock().await;
        let id = registry.next_id;
        registry.next_id += 1;

        let download = Download::new(id, url.to_string(), domain);
        let snapshot = download.snapshot();
        registry.downloads.push(download);

        tracing::info!("Added download #{} for {}", id, url);
        Ok(snapshot)
    }

    fn validate_url(&self, url: &str) -> Result<String, ManagerError> {
        if url.is_empty() {
            return Err(ManagerError::Validation("No url supplied".to_string()));
        }

        let own_address = self
            .config
            .server
            .address
            .trim()
            .trim_end_matches('/')
            .to_ascii_lowercase();
        if !own_address.is_empty() && url.to_ascii_lowercase().contains(&own_address) {
            tracing::warn!("Refusing to download from this server itself: {}", url);
            return Err(ManagerError::Validation(
                "Refusing to download from this server's own address".to_string(),
            ));
        }

        let parsed = url::Url::parse(url)
            .map_err(|e| ManagerError::Validation(format!("Invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ManagerError::Validation(format!(
                "Unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }

        extract_domain(url)
            .ok_or_else(|| ManagerError::Validation(format!("URL '{}' has no host", url)))
    }

    pub async fn get_by_id(&self, id: u64) -> Result<DownloadSnapshot, ManagerError> {
        let registry = self.registry.lock().await;
        registry.get(id).map(Download::snapshot)
    }

    /// All downloads in creation order
    pub async fn snapshot(&self) -> Vec<DownloadSnapshot> {
        let registry = self.registry.lock().await;
        registry.downloads.iter().map(Download::snapshot).collect()
    }

    /// JSON array of all downloads, serialized while the guard is held
    pub async fn downloads_as_json(&self) -> Result<Vec<u8>, ManagerError> {
        let registry = self.registry.lock().await;
        let snapshots: Vec<DownloadSnapshot> =
            registry.downloads.iter().map(Download::snapshot).collect();
        Ok(serde_json::to_vec(&snapshots)?)
    }

    /// Running downloads currently holding a slot for `domain`
    pub async fn active_for_domain(&self, domain: &str) -> usize {
        self.registry.lock().await.admission.active(domain)
    }

    // ========== Mutations ==========

    /// Confirm a queued download is ready for the scheduler
    pub async fn queue(&self, id: u64) -> Result<(), ManagerError> {
        let registry = self.registry.lock().await;
        let download = registry.get(id)?;
        if download.state() != DownloadState::Queued {
            return Err(ManagerError::InvalidState {
                id,
                state: download.state(),
                action: "queue",
            });
        }
        if download.profile().is_none() {
            return Err(ManagerError::Validation(format!(
                "Download #{} has no profile; choose one first",
                id
            )));
        }
        Ok(())
    }

    /// Choose the profile of a queued download, making it eligible to start
    pub async fn set_profile_and_queue(&self, id: u64, profile: &str) -> Result<(), ManagerError> {
        let profile = self
            .config
            .profile_called(profile)
            .cloned()
            .ok_or_else(|| ManagerError::Validation(format!("Unknown profile '{}'", profile)))?;

        let mut registry = self.registry.lock().await;
        let download = registry.get_mut(id)?;
        if download.state() != DownloadState::Queued {
            return Err(ManagerError::InvalidState {
                id,
                state: download.state(),
                action: "set the profile of",
            });
        }
        tracing::info!("Download #{} queued with profile '{}'", id, profile.name);
        download.set_profile(profile);
        Ok(())
    }

    /// Change where the finished file should live. `None` means don't move.
    ///
    /// For a finished download the files are moved right away. A failed move
    /// is returned as an error but the new destination stays stored. Moves of
    /// the same download run one after another, each towards whatever
    /// destination is stored when it starts.
    pub async fn change_destination(
        &self,
        id: u64,
        destination: Option<&str>,
    ) -> Result<(), ManagerError> {
        let destination = match destination.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Some(self.config.destination_called(name).cloned().ok_or_else(
                || ManagerError::Validation(format!("Unknown destination '{}'", name)),
            )?),
            None => None,
        };

        let move_lock = {
            let mut registry = self.registry.lock().await;
            let download = registry.get_mut(id)?;
            download.set_destination(destination.clone());
            if download.state() == DownloadState::Complete
                && destination.is_some()
                && download.files().is_empty()
            {
                let e = RelocateError::NoOutputFile;
                download.log(LogEntry::error(format!("Move failed: {}", e)));
                return Err(ManagerError::Relocate(e));
            }
            if pending_relocation(download).is_none() {
                return Ok(());
            }
            registry.move_lock(id)
        };

        self.relocate(id, move_lock).await
    }

    /// Stop a queued or running download.
    ///
    /// A running download keeps its slot until the runner reports that the
    /// process has exited; this call only signals it.
    pub async fn stop(&self, id: u64) -> Result<StopOutcome, ManagerError> {
        let mut registry = self.registry.lock().await;
        let download = registry.get_mut(id)?;
        match download.state() {
            DownloadState::Queued => {
                download.mark_stopped_before_start();
                tracing::info!("Download #{} stopped before starting", id);
                Ok(StopOutcome::Stopped)
            }
            DownloadState::Running => {
                download.request_stop();
                tracing::info!("Stop requested for download #{}", id);
                Ok(StopOutcome::StopRequested)
            }
            state => Err(ManagerError::InvalidState {
                id,
                state,
                action: "stop",
            }),
        }
    }

    // ========== Scheduling ==========

    /// One scheduling pass: prune expired downloads, then start every
    /// startable download whose domain has a free slot, oldest first.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        let mut watchers = Vec::new();

        {
            let mut registry = self.registry.lock().await;
            report.pruned = registry.prune_finished(Utc::now(), self.retention());
            if report.pruned > 0 {
                tracing::debug!("Pruned {} finished downloads", report.pruned);
            }

            let Registry {
                downloads,
                admission,
                ..
            } = &mut *registry;

            for download in downloads.iter_mut().filter(|d| d.is_startable()) {
                if !admission.try_acquire(download.domain()) {
                    tracing::trace!(
                        "No free slot for {} (download #{})",
                        download.domain(),
                        download.id()
                    );
                    continue;
                }

                let Some(profile) = download.profile().cloned() else {
                    admission.release(download.domain());
                    continue;
                };
                let request = RunRequest {
                    id: download.id(),
                    url: download.url().to_string(),
                    profile,
                    working_dir: self.config.server.download_path.clone(),
                };

                match self.runner.start(request) {
                    Ok(handle) => {
                        download.mark_running(handle.control);
                        tracing::info!(
                            "Started download #{} ({}/{} active for {})",
                            download.id(),
                            admission.active(download.domain()),
                            admission.max_per_domain(),
                            download.domain()
                        );
                        report.started.push(download.id());
                        watchers.push((download.id(), handle.events));
                    }
                    Err(e) => {
                        tracing::error!("Failed to start download #{}: {}", download.id(), e);
                        admission.release(download.domain());
                        download.fail_to_start(e.to_string());
                        report.failed_to_start.push(download.id());
                    }
                }
            }
        }

        for (id, events) in watchers {
            tokio::spawn(self.clone().watch(id, events));
        }

        report
    }

    /// Run the scheduler forever at the given interval
    pub async fn run_queue(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = self.tick().await;
            if !report.is_idle() {
                tracing::debug!("Scheduler pass: {:?}", report);
            }
        }
    }

    /// Spawn [`run_queue`](Self::run_queue) with the configured interval
    pub fn spawn_queue_loop(&self) -> JoinHandle<()> {
        let interval = self.queue_interval();
        tokio::spawn(self.clone().run_queue(interval))
    }

    // ========== Process Supervision ==========

    /// Sole consumer of one process's events until it finishes
    async fn watch(self, id: u64, mut events: mpsc::UnboundedReceiver<RunEvent>) {
        let mut outcome = None;

        while outcome.is_none() {
            let Some(first) = events.recv().await else {
                break;
            };

            let mut registry = self.registry.lock().await;
            let Ok(download) = registry.get_mut(id) else {
                tracing::warn!("Download #{} vanished while running", id);
                return;
            };

            let mut next = Some(first);
            while let Some(event) = next.take() {
                match event {
                    RunEvent::Output(line) => {
                        self.record_output(download, line);
                        next = events.try_recv().ok();
                    }
                    RunEvent::Finished(result) => outcome = Some(result),
                }
            }
        }

        let outcome = outcome.unwrap_or_else(|| RunOutcome::Failure {
            message: "downloader exited without reporting a result".to_string(),
        });
        self.finish_run(id, outcome).await;
    }

    fn record_output(&self, download: &mut Download, line: String) {
        if let Some(update) = progress::parse_line(&line) {
            download.apply_progress(resolve_update(update, &self.config.server.download_path));
        }
        download.log(LogEntry::info(line));
    }

    /// Apply the terminal outcome and release the domain slot exactly once
    async fn finish_run(&self, id: u64, outcome: RunOutcome) {
        let pending_move = {
            let mut registry = self.registry.lock().await;
            let Registry {
                downloads,
                admission,
                moves,
                ..
            } = &mut *registry;
            let Ok(pos) = downloads.binary_search_by_key(&id, |d| d.id()) else {
                tracing::warn!("Finished download #{} is no longer registered", id);
                return;
            };
            let download = &mut downloads[pos];

            let (state, message) = match outcome {
                RunOutcome::Success { files } => {
                    if !files.is_empty() {
                        download.replace_files(files);
                    }
                    (DownloadState::Complete, None)
                }
                RunOutcome::Failure { message } if download.stop_requested() => {
                    (DownloadState::Stopped, Some(message))
                }
                RunOutcome::Failure { message } => (DownloadState::Error, Some(message)),
            };

            if !download.finish(state, message) {
                tracing::warn!(
                    "Ignoring duplicate result for download #{} ({})",
                    id,
                    download.state()
                );
                return;
            }
            admission.release(download.domain());
            tracing::info!(
                "Download #{} finished as {} ({} still active for {})",
                id,
                state,
                admission.active(download.domain()),
                download.domain()
            );

            if state == DownloadState::Complete && pending_relocation(download).is_some() {
                Some(moves.entry(id).or_default().clone())
            } else {
                None
            }
        };

        if let Some(move_lock) = pending_move {
            if let Err(e) = self.relocate(id, move_lock).await {
                tracing::warn!("Download #{}: {}", id, e);
            }
        }
    }

    /// Move the files of a finished download to its stored destination.
    ///
    /// `move_lock` keeps a second move of the same download waiting until
    /// this one has recorded its result. The files and folder are read after
    /// it is taken, and only entries that actually moved are rewritten.
    async fn relocate(&self, id: u64, move_lock: Arc<Mutex<()>>) -> Result<(), ManagerError> {
        let _moving = move_lock.lock().await;

        let pending_move = {
            let registry = self.registry.lock().await;
            registry.get(id).ok().and_then(pending_relocation)
        };
        let Some((files, folder)) = pending_move else {
            return Ok(());
        };

        let relocation = relocate_files(&files, &folder).await;

        let mut registry = self.registry.lock().await;
        if let Ok(download) = registry.get_mut(id) {
            download.record_moves(&relocation.moved);
            match &relocation.error {
                Some(e) => download.log(LogEntry::error(format!("Move failed: {}", e))),
                None => download.log(LogEntry::info(format!(
                    "Moved files to {}",
                    folder.display()
                ))),
            }
        }

        match relocation.error {
            Some(e) => Err(ManagerError::Relocate(e)),
            None => Ok(()),
        }
    }
}

/// Files to move when a download has finished and has a destination
fn pending_relocation(download: &Download) -> Option<(Vec<PathBuf>, PathBuf)> {
    if !download.state().is_terminal() || download.files().is_empty() {
        return None;
    }
    download
        .destination()
        .map(|Destination { path, .. }| (download.files().to_vec(), path.clone()))
}

/// Output paths are relative to the downloader's working directory
fn resolve_update(update: ProgressUpdate, base: &Path) -> ProgressUpdate {
    let resolve = |path: PathBuf| {
        if path.is_absolute() {
            path
        } else {
            base.join(path)
        }
    };
    match update {
        ProgressUpdate::File { path } => ProgressUpdate::File {
            path: resolve(path),
        },
        ProgressUpdate::AlreadyDownloaded { path } => ProgressUpdate::AlreadyDownloaded {
            path: resolve(path),
        },
        ProgressUpdate::Merged { path } => ProgressUpdate::Merged {
            path: resolve(path),
        },
        other => other,
    }
}
