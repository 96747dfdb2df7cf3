//! Parsing of downloader output lines
//!
//! The external tool (yt-dlp style) reports progress on stdout one line at a
//! time. Each recognised line maps to one [`ProgressUpdate`]; everything else
//! is only kept in the download's log.

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// `[download]  42.1% of 10.00MiB at 1.00MiB/s ETA 00:05`
    Percent { percent: f32, eta: Option<String> },
    /// `[download] Destination: <file>` or `[ExtractAudio] Destination: <file>`
    File { path: PathBuf },
    /// `[download] <file> has already been downloaded`
    AlreadyDownloaded { path: PathBuf },
    /// `[Merger] Merging formats into "<file>"`
    Merged { path: PathBuf },
    /// `[download] Downloading video 2 of 5`
    Playlist { current: u32, total: u32 },
}

static PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").expect("Invalid regex pattern")
});
static ETA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ETA\s+(\S+)").expect("Invalid regex pattern"));
static DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?:download|ExtractAudio)\]\s+Destination:\s+(.+)$")
        .expect("Invalid regex pattern")
});
static ALREADY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+(.+) has already been downloaded").expect("Invalid regex pattern")
});
static MERGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[Merger\]\s+Merging formats into "(.+)"$"#).expect("Invalid regex pattern")
});
static PLAYLIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[download\]\s+Downloading (?:video|item) (\d+) of (\d+)")
        .expect("Invalid regex pattern")
});

/// Interpret one output line
pub fn parse_line(line: &str) -> Option<ProgressUpdate> {
    let line = line.trim();
    if let Some(caps) = MERGED.captures(line) {
        return Some(ProgressUpdate::Merged {
            path: PathBuf::from(&caps[1]),
        });
    }
    if let Some(caps) = DESTINATION.captures(line) {
        return Some(ProgressUpdate::File {
            path: PathBuf::from(caps[1].trim()),
        });
    }
    if let Some(caps) = ALREADY.captures(line) {
        return Some(ProgressUpdate::AlreadyDownloaded {
            path: PathBuf::from(caps[1].trim()),
        });
    }
    if let Some(caps) = PLAYLIST.captures(line) {
        let current = caps[1].parse().ok()?;
        let total = caps[2].parse().ok()?;
        return Some(ProgressUpdate::Playlist { current, total });
    }
    if let Some(caps) = PERCENT.captures(line) {
        let percent: f32 = caps[1].parse().ok()?;
        let eta = ETA
            .captures(line)
            .map(|c| c[1].to_string())
            .filter(|e| e != "Unknown");
        return Some(ProgressUpdate::Percent {
            percent: percent.clamp(0.0, 100.0),
            eta,
        });
    }
    None
}
