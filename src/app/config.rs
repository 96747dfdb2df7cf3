use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete configuration (saved to config/config.toml)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub profiles: Vec<DownloadProfile>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Control socket port on 127.0.0.1
    pub port: u16,
    /// Public address the bookmarklet points at; URLs containing it are refused
    pub address: String,
    /// Working directory of the downloader
    pub download_path: PathBuf,
    /// Running downloads allowed per source domain
    pub maximum_active_downloads: usize,
    /// How long finished downloads stay listed
    #[serde(default = "default_finished_retention_secs")]
    pub finished_retention_secs: u64,
    /// Scheduler tick
    #[serde(default = "default_queue_interval_ms")]
    pub queue_interval_ms: u64,
}

fn default_finished_retention_secs() -> u64 {
    3600
}

fn default_queue_interval_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiConfig {
    pub popup_width: u32,
    pub popup_height: u32,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            popup_width: 500,
            popup_height: 500,
        }
    }
}

/// Named format/quality preset: the command line run for a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProfile {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Named folder finished files can be moved into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: 6123,
                address: "http://localhost:6123".to_string(),
                download_path: crate::util::paths::resolve_default_download_directory(),
                maximum_active_downloads: 2,
                finished_retention_secs: default_finished_retention_secs(),
                queue_interval_ms: default_queue_interval_ms(),
            },
            ui: UiConfig::default(),
            profiles: vec![
                DownloadProfile {
                    name: "standard video".to_string(),
                    command: "yt-dlp".to_string(),
                    args: vec!["--newline".to_string()],
                },
                DownloadProfile {
                    name: "standard mp3".to_string(),
                    command: "yt-dlp".to_string(),
                    args: vec![
                        "--newline".to_string(),
                        "--extract-audio".to_string(),
                        "--audio-format".to_string(),
                        "mp3".to_string(),
                    ],
                },
            ],
            destinations: Vec::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name
    pub fn profile_called(&self, name: &str) -> Option<&DownloadProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    /// Look up a destination by name
    pub fn destination_called(&self, name: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.name == name)
    }

    /// Load from the discovered config directory, writing defaults when the
    /// file does not exist yet.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = crate::util::paths::get_config_path()?;

        if !config_path.exists() {
            tracing::info!("No config file - creating default config");
            let config = Self::default();
            config.save()?;
            tracing::info!("Configuration written to {:?}", config_path);
            return Ok(config);
        }

        let config = Self::load_from(&config_path)?;
        tracing::info!("Configuration loaded from {:?}", config_path);
        Ok(config)
    }

    /// Load and validate a specific file
    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
        let mut config: Config =
            toml::from_str(&content).context(format!("Failed to parse {:?}", path))?;

        config.server.download_path =
            crate::util::paths::resolve_relative_to_config(&config.server.download_path);

        if let Err(errors) = crate::app::settings::validate_config(&config) {
            return Err(anyhow::anyhow!(
                "Invalid configuration: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        Ok(config)
    }

    /// Save to the discovered config directory
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = crate::util::paths::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &std::path::Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Err(errors) = crate::app::settings::validate_config(self) {
            return Err(anyhow::anyhow!(
                "Cannot save invalid config: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;

        // Atomic write using temp file + rename
        let temp_path = config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &content).context("Failed to write temp config file")?;
        std::fs::rename(&temp_path, config_path).context("Failed to rename temp config file")?;

        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_has_profiles() {
        let config = Config::default();
        assert_eq!(config.profiles.len(), 2);
        assert!(config.profile_called("standard video").is_some());
        assert!(config.profile_called("nope").is_none());
        assert_eq!(config.server.finished_retention_secs, 3600);
    }

    #[test]
    fn test_destination_lookup() {
        let mut config = Config::default();
        config.destinations.push(Destination {
            name: "music".to_string(),
            path: PathBuf::from("/srv/music"),
        });
        assert_eq!(
            config.destination_called("music").map(|d| d.path.clone()),
            Some(PathBuf::from("/srv/music"))
        );
        assert!(config.destination_called("videos").is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let mut config = Config::default();
        config.server.download_path = temp_dir.path().to_path_buf();
        config.server.maximum_active_downloads = 4;

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_optional_sections_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let toml = format!(
            r#"
[server]
port = 7000
address = "http://example.local:7000"
download_path = "{}"
maximum_active_downloads = 1

[[profiles]]
name = "video"
command = "yt-dlp"
"#,
            temp_dir.path().display()
        );
        std::fs::write(&path, toml).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.queue_interval_ms, 1000);
        assert_eq!(config.server.finished_retention_secs, 3600);
        assert_eq!(config.ui, UiConfig::default());
        assert!(config.profiles[0].args.is_empty());
        assert!(config.destinations.is_empty());
    }

    #[test]
    fn test_load_rejects_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let toml = r#"
[server]
port = 7000
address = "http://example.local:7000"
download_path = "/tmp"
maximum_active_downloads = 0
"#;
        std::fs::write(&path, toml).unwrap();

        let err = Config::load_from(&path).unwrap_err().to_string();
        assert!(err.contains("Invalid configuration"), "{}", err);
    }
}
