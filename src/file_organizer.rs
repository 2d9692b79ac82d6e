/// Destination resolution and the file move primitive.
///
/// This module computes collision-free destinations inside the PARA tree and
/// moves files there, renaming when possible and falling back to copy+delete
/// when the destination lives on another filesystem.
///
/// The check-then-use sequence in [`uniquify`] is not safe against another
/// process sorting into the same directory at the same time; there is no
/// locking.
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during file organization operations.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Failed to read the inbox or another directory.
    #[error("Failed to read directory {}: {source}", path.display())]
    ReadDirFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to create a destination directory.
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to move a file.
    #[error("Failed to move {} to {}: {source}", from.display(), to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A path has no file name component.
    #[error("Path has no file name: {}", .0.display())]
    MissingFileName(PathBuf),
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Returns `path` if nothing exists there, otherwise the first free
/// `name (N).ext` with N counting up from 2.
pub fn uniquify(path: &Path) -> PathBuf {
    uniquify_with(path, |candidate| candidate.exists())
}

fn uniquify_with(path: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    if !taken(path) {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    (2u64..)
        .map(|i| parent.join(format!("{} ({}){}", stem, i, suffix)))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Hands out destinations for one batch.
///
/// A destination is taken if it exists on disk or was already handed out in
/// this batch, so planning gives the same answers whether or not earlier moves
/// have been performed yet.
#[derive(Debug, Default)]
pub struct DestinationResolver {
    claimed: HashSet<PathBuf>,
}

impl DestinationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes and claims a collision-free `target_dir / file_name`.
    pub fn resolve(&mut self, target_dir: &Path, file_name: &std::ffi::OsStr) -> PathBuf {
        let destination = uniquify_with(&target_dir.join(file_name), |candidate| {
            candidate.exists() || self.claimed.contains(candidate)
        });
        self.claimed.insert(destination.clone());
        destination
    }
}

/// Creates `dir` and its parents if absent.
pub fn ensure_dir(dir: &Path) -> OrganizeResult<()> {
    fs::create_dir_all(dir).map_err(|source| OrganizeError::DirectoryCreationFailed {
        path: dir.to_path_buf(),
        source,
    })
}

/// Moves a file, creating the destination's parent directories first.
///
/// Uses `rename` and falls back to copy+delete across filesystems.
pub fn move_file(source: &Path, destination: &Path) -> OrganizeResult<()> {
    if let Some(parent) = destination.parent() {
        ensure_dir(parent)?;
    }

    let failure = |error: io::Error| OrganizeError::FileMoveFailure {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: error,
    };

    match fs::rename(source, destination) {
        Ok(()) => {
            tracing::debug!(src = %source.display(), dst = %destination.display(), "renamed");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(src = %source.display(), "rename crosses devices, copying");
            fs::copy(source, destination).map_err(failure)?;
            fs::remove_file(source).map_err(failure)
        }
        Err(e) => Err(failure(e)),
    }
}
