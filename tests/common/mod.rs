use snare::app::config::{Config, Destination};
use snare::download::manager::DownloadManager;
use snare::download::runner::{
    ProcessRunner, RunControl, RunEvent, RunHandle, RunOutcome, RunRequest, RunnerError,
};
use snare::download::task::DownloadState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// One job handed to the fake runner
struct FakeJob {
    events: mpsc::UnboundedSender<RunEvent>,
    stop: oneshot::Receiver<()>,
    stop_seen: bool,
}

/// Runner that spawns nothing; tests drive each job's events by hand
#[derive(Default)]
pub struct FakeRunner {
    jobs: Mutex<HashMap<u64, FakeJob>>,
    started: Mutex<Vec<RunRequest>>,
    refuse: Mutex<bool>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ids in the order they were started
    pub fn started_ids(&self) -> Vec<u64> {
        self.started.lock().unwrap().iter().map(|r| r.id).collect()
    }

    #[allow(dead_code)]
    pub fn request(&self, id: u64) -> Option<RunRequest> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Make every following start fail
    #[allow(dead_code)]
    pub fn refuse_starts(&self) {
        *self.refuse.lock().unwrap() = true;
    }

    #[allow(dead_code)]
    pub fn output(&self, id: u64, line: &str) {
        self.send(id, RunEvent::Output(line.to_string()));
    }

    pub fn succeed(&self, id: u64, files: Vec<PathBuf>) {
        self.send(id, RunEvent::Finished(RunOutcome::Success { files }));
    }

    pub fn fail(&self, id: u64, message: &str) {
        self.send(
            id,
            RunEvent::Finished(RunOutcome::Failure {
                message: message.to_string(),
            }),
        );
    }

    /// Close the event stream without a result
    #[allow(dead_code)]
    pub fn vanish(&self, id: u64) {
        self.jobs.lock().unwrap().remove(&id);
    }

    /// Whether the manager has signalled this job to stop
    pub fn stop_signalled(&self, id: u64) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(&id) else {
            return false;
        };
        if !job.stop_seen {
            job.stop_seen = job.stop.try_recv().is_ok();
        }
        job.stop_seen
    }

    fn send(&self, id: u64, event: RunEvent) {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs.get(&id).unwrap_or_else(|| panic!("job #{} was never started", id));
        let _ = job.events.send(event);
    }
}

impl ProcessRunner for FakeRunner {
    fn start(&self, request: RunRequest) -> Result<RunHandle, RunnerError> {
        if *self.refuse.lock().unwrap() {
            return Err(RunnerError::Unavailable("fake runner refused".to_string()));
        }
        let (control, stop) = RunControl::channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        self.jobs.lock().unwrap().insert(
            request.id,
            FakeJob {
                events: events_tx,
                stop,
                stop_seen: false,
            },
        );
        self.started.lock().unwrap().push(request);
        Ok(RunHandle { control, events })
    }
}

/// Address the test daemon claims to be reachable at
pub const TEST_ADDRESS: &str = "http://snare.test:6123";

/// Config rooted in `dir` with one "archive" destination
pub fn create_test_config(dir: &Path, max_per_domain: usize) -> Config {
    let mut config = Config::default();
    config.server.address = TEST_ADDRESS.to_string();
    config.server.download_path = dir.join("downloads");
    config.server.maximum_active_downloads = max_per_domain;
    config.server.queue_interval_ms = 20;
    config.destinations = ["archive", "other"]
        .into_iter()
        .map(|name| Destination {
            name: name.to_string(),
            path: dir.join(name),
        })
        .collect();
    std::fs::create_dir_all(&config.server.download_path).unwrap();
    for destination in &config.destinations {
        std::fs::create_dir_all(&destination.path).unwrap();
    }
    config
}

pub fn create_test_manager(config: Config, runner: Arc<FakeRunner>) -> DownloadManager {
    DownloadManager::new(Arc::new(config), runner)
}

/// Add a URL and give it the first profile
#[allow(dead_code)]
pub async fn add_queued(manager: &DownloadManager, url: &str) -> u64 {
    let download = manager.add_download(url).await.unwrap();
    manager
        .set_profile_and_queue(download.id, "standard video")
        .await
        .unwrap();
    download.id
}

/// Helper to wait for a download to reach a specific state
pub async fn wait_for_state(
    manager: &DownloadManager,
    id: u64,
    expected: DownloadState,
    timeout_secs: u64,
) -> Result<(), String> {
    use tokio::time::{timeout, Duration};

    timeout(Duration::from_secs(timeout_secs), async {
        loop {
            if let Ok(download) = manager.get_by_id(id).await {
                if download.state == expected {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| format!("Timeout waiting for #{} to become {}", id, expected))
}
