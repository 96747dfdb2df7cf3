//! External downloader process boundary
//!
//! The manager never touches processes directly. It asks a [`ProcessRunner`]
//! to start a job and gets back a [`RunHandle`]: a stop control plus an
//! ordered event stream of output lines terminated by exactly one
//! [`RunEvent::Finished`].

use super::progress::{self, ProgressUpdate};
use crate::app::config::DownloadProfile;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};

/// What a runner needs to start one download
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub id: u64,
    pub url: String,
    pub profile: DownloadProfile,
    pub working_dir: PathBuf,
}

/// Terminal result of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success { files: Vec<PathBuf> },
    Failure { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// One line of stdout/stderr, in arrival order
    Output(String),
    /// Sent exactly once, last
    Finished(RunOutcome),
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Downloader unavailable: {0}")]
    Unavailable(String),
}

/// Stop signal for one running process.
///
/// Stopping is advisory: the runner decides when the process is actually
/// gone and reports it through the event stream.
#[derive(Debug)]
pub struct RunControl {
    stop: Option<oneshot::Sender<()>>,
}

impl RunControl {
    /// Create a control and the receiving end the runner watches
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { stop: Some(tx) }, rx)
    }

    /// Idempotent and never blocks. A send error only means the process
    /// has already finished.
    pub fn request_stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.is_none()
    }
}

pub struct RunHandle {
    pub control: RunControl,
    pub events: mpsc::UnboundedReceiver<RunEvent>,
}

/// Starts external downloads. `start` must return promptly; the work
/// itself happens on a task the runner owns.
pub trait ProcessRunner: Send + Sync {
    fn start(&self, request: RunRequest) -> Result<RunHandle, RunnerError>;
}

/// Runs the profile's command line with the URL appended
#[derive(Debug, Default, Clone)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for CommandRunner {
    fn start(&self, request: RunRequest) -> Result<RunHandle, RunnerError> {
        if request.profile.command.trim().is_empty() {
            return Err(RunnerError::Unavailable(format!(
                "profile '{}' has no command",
                request.profile.name
            )));
        }

        let mut cmd = Command::new(&request.profile.command);
        cmd.args(&request.profile.args)
            .arg(&request.url)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::info!(
            "Spawning downloader for #{}: {} {:?} {}",
            request.id,
            request.profile.command,
            request.profile.args,
            request.url
        );

        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: request.profile.command.clone(),
            source,
        })?;

        let (control, stop_rx) = RunControl::channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(supervise(child, request, stop_rx, event_tx));

        Ok(RunHandle { control, events })
    }
}

/// Forward output, honour a stop request, and report the exit exactly once
async fn supervise(
    mut child: tokio::process::Child,
    request: RunRequest,
    mut stop_rx: oneshot::Receiver<()>,
    event_tx: mpsc::UnboundedSender<RunEvent>,
) {
    let mut stdout = child.stdout.take().map(|s| BufReader::new(s).lines());
    let mut stderr = child.stderr.take().map(|s| BufReader::new(s).lines());

    let mut files: Vec<PathBuf> = Vec::new();
    let mut last_stderr: Option<String> = None;
    let mut stop_pending = true;

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_line(&mut stdout), if stdout.is_some() => match line {
                Some(line) => {
                    track_file(&mut files, &line);
                    let _ = event_tx.send(RunEvent::Output(line));
                }
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line {
                Some(line) => {
                    if !line.trim().is_empty() {
                        last_stderr = Some(line.clone());
                    }
                    let _ = event_tx.send(RunEvent::Output(line));
                }
                None => stderr = None,
            },
            result = &mut stop_rx, if stop_pending => {
                stop_pending = false;
                if result.is_ok() {
                    tracing::info!("Stopping downloader for #{}", request.id);
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("Failed to signal downloader for #{}: {}", request.id, e);
                    }
                }
            }
        }
    }

    let outcome = match child.wait().await {
        Ok(status) if status.success() => RunOutcome::Success {
            files: files
                .into_iter()
                .map(|f| request.working_dir.join(f))
                .collect(),
        },
        Ok(status) => {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let message = match last_stderr {
                Some(line) => format!("exit code {}: {}", code, line),
                None => format!("exit code {}", code),
            };
            RunOutcome::Failure { message }
        }
        Err(e) => RunOutcome::Failure {
            message: format!("failed to wait for downloader: {}", e),
        },
    };

    tracing::debug!("Downloader for #{} finished: {:?}", request.id, outcome);
    let _ = event_tx.send(RunEvent::Finished(outcome));
}

async fn next_line<R>(lines: &mut Option<tokio::io::Lines<R>>) -> Option<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    match lines.as_mut() {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

fn track_file(files: &mut Vec<PathBuf>, line: &str) {
    match progress::parse_line(line) {
        Some(ProgressUpdate::File { path }) | Some(ProgressUpdate::AlreadyDownloaded { path }) => {
            if !files.contains(&path) {
                files.push(path);
            }
        }
        Some(ProgressUpdate::Merged { path }) => *files = vec![path],
        _ => {}
    }
}
