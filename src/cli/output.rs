use crate::download::task::{DownloadSnapshot, DownloadState};

/// Format a single download for display
pub fn format_download(download: &DownloadSnapshot, detailed: bool) -> String {
    let mut output = String::new();

    if detailed {
        output.push_str(&format!("ID: {}\n", download.id));
        output.push_str(&format!("URL: {}\n", download.url));
        output.push_str(&format!("Domain: {}\n", download.domain));
        output.push_str(&format!("State: {}\n", download.state));

        if let Some(profile) = &download.profile {
            output.push_str(&format!("Profile: {}\n", profile.name));
        }
        if let Some(destination) = &download.destination {
            output.push_str(&format!(
                "Destination: {} ({})\n",
                destination.name,
                destination.path.display()
            ));
        }
        if let Some(percent) = download.percent {
            output.push_str(&format!("Progress: {:.1}%\n", percent));
        }
        if let Some(eta) = &download.eta {
            output.push_str(&format!("ETA: {}\n", eta));
        }
        if let (Some(current), Some(total)) = (download.playlist_current, download.playlist_total)
        {
            output.push_str(&format!("Playlist: {} of {}\n", current, total));
        }
        for file in &download.files {
            output.push_str(&format!("File: {}\n", file.display()));
        }
        if let Some(message) = &download.error_message {
            output.push_str(&format!("Error: {}\n", message));
        }

        output.push_str(&format!(
            "Created: {}\n",
            download.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(started) = download.started_at {
            output.push_str(&format!("Started: {}\n", started.format("%Y-%m-%d %H:%M:%S")));
        }
        if let Some(finished) = download.finished_at {
            output.push_str(&format!("Finished: {}\n", finished.format("%Y-%m-%d %H:%M:%S")));
        }

        if !download.logs.is_empty() {
            output.push_str("Log:\n");
            for entry in &download.logs {
                output.push_str(&format!(
                    "  {} [{:?}] {}\n",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.level,
                    entry.message
                ));
            }
        }
    } else {
        // Compact format for lists
        let progress = match (download.state, download.percent) {
            (DownloadState::Complete, _) => "100%".to_string(),
            (_, Some(percent)) => format!("{:.0}%", percent),
            (_, None) => "-".to_string(),
        };
        let profile = download
            .profile
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or("no profile");

        output.push_str(&format!(
            "#{:<4} {:<8} {:>5}  {}  ({})",
            download.id, download.state, progress, download.url, profile
        ));
    }

    output
}

/// Format multiple downloads for display (human or JSON)
pub fn format_downloads(downloads: &[DownloadSnapshot], json: bool) -> String {
    if json {
        serde_json::to_string_pretty(downloads).unwrap_or_else(|_| "[]".to_string())
    } else {
        if downloads.is_empty() {
            return "No downloads.".to_string();
        }

        downloads
            .iter()
            .map(|download| format_download(download, false))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
