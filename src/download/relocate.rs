//! Moving finished files into a destination folder
//!
//! Best effort: every file is attempted, and the first failure is reported
//! together with the paths that did move.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelocateError {
    #[error("Output file {0} no longer exists")]
    Missing(PathBuf),

    #[error("No output file recorded")]
    NoOutputFile,

    #[error("Destination folder {0} does not exist")]
    NoSuchFolder(PathBuf),

    #[error("Failed to move {from} to {to}: {source}")]
    Io {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

/// Result of moving a set of files
#[derive(Debug)]
pub struct Relocation {
    /// New location of every file, or its old one if it could not be moved
    pub files: Vec<PathBuf>,
    /// `(from, to)` for every file that changed location
    pub moved: Vec<(PathBuf, PathBuf)>,
    pub error: Option<RelocateError>,
}

/// Move `files` into `folder`, keeping their file names
pub async fn relocate_files(files: &[PathBuf], folder: &Path) -> Relocation {
    let mut placed = Vec::with_capacity(files.len());
    let mut moved = Vec::new();
    let mut error = None;

    if !tokio::fs::metadata(folder)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return Relocation {
            files: files.to_vec(),
            moved,
            error: Some(RelocateError::NoSuchFolder(folder.to_path_buf())),
        };
    }

    for file in files {
        match move_one(file, folder).await {
            Ok(target) => {
                if target != *file {
                    moved.push((file.clone(), target.clone()));
                }
                placed.push(target);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                placed.push(file.clone());
                error.get_or_insert(e);
            }
        }
    }

    Relocation {
        files: placed,
        moved,
        error,
    }
}

async fn move_one(file: &Path, folder: &Path) -> Result<PathBuf, RelocateError> {
    let Some(name) = file.file_name() else {
        return Err(RelocateError::Missing(file.to_path_buf()));
    };
    let target = folder.join(name);
    if target == file {
        return Ok(target);
    }
    if !tokio::fs::try_exists(file).await.unwrap_or(false) {
        return Err(RelocateError::Missing(file.to_path_buf()));
    }

    let io_err = |source| RelocateError::Io {
        from: file.to_path_buf(),
        to: target.clone(),
        source,
    };

    if tokio::fs::rename(file, &target).await.is_err() {
        // Cross-device: copy then remove
        tokio::fs::copy(file, &target).await.map_err(io_err)?;
        tokio::fs::remove_file(file).await.map_err(io_err)?;
    }

    tracing::info!("Moved {} to {}", file.display(), target.display());
    Ok(target)
}
