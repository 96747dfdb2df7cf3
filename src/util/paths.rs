//! Where snare keeps its files on disk.
//!
//! Everything hangs off one directory holding `config.toml` and the `.logs`
//! folder written by the daemon.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const CONFIG_DIR_ENV: &str = "SNARE_CONFIG_DIR";
const CONFIG_FILE: &str = "config.toml";

/// Directory chosen with `--config`; wins over every other location
static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

pub fn set_config_dir_override(path: Option<PathBuf>) {
    *CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = path;
}

pub fn get_config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Existing directories that may hold snare's config, most specific first:
/// `$SNARE_CONFIG_DIR`, the platform config dir, then `./config`.
fn existing_config_dirs() -> impl Iterator<Item = PathBuf> {
    let from_env = std::env::var_os(CONFIG_DIR_ENV).map(PathBuf::from);
    let per_user = get_user_config_dir().ok();
    let local = std::env::current_dir().ok().map(|cwd| cwd.join("config"));

    [from_env, per_user, local]
        .into_iter()
        .flatten()
        .filter(|dir| dir.is_dir())
}

/// The directory snare reads `config.toml` from.
///
/// A `--config` directory is created if needed. Otherwise the first existing
/// directory from `existing_config_dirs` is used, and when there is none the
/// per-user directory is created so the daemon has somewhere to write logs.
pub fn find_config_directory() -> Result<PathBuf> {
    if let Some(dir) = get_config_dir_override() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        tracing::debug!("Config directory (--config): {}", dir.display());
        return Ok(dir);
    }

    if let Some(dir) = existing_config_dirs().next() {
        tracing::debug!("Config directory: {}", dir.display());
        return Ok(dir);
    }

    let dir = get_user_config_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    tracing::info!("Created config directory {}", dir.display());
    Ok(dir)
}

fn get_user_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|base| base.join("snare"))
        .context("No per-user config directory on this platform")
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join(CONFIG_FILE))
}

/// Where downloads land when the config names no `download_path`
pub fn resolve_default_download_directory() -> PathBuf {
    dirs::download_dir()
        .or_else(|| std::env::current_dir().ok().map(|cwd| cwd.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

/// Relative paths in `config.toml` are taken from the config directory.
/// If that directory can't be found the path is returned unchanged.
pub fn resolve_relative_to_config(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    find_config_directory()
        .map(|dir| dir.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

pub fn get_logs_dir() -> Result<PathBuf> {
    Ok(find_config_directory()?.join(".logs"))
}
