//! Batch sorting of an inbox by extension rules.
//!
//! Each immediate entry of the inbox is classified, in order:
//!
//! 1. directory → skipped (the log store directory is passed over silently)
//! 2. matches a `[filters]` pattern → skipped
//! 3. no extension → skipped
//! 4. no rule for the extension → skipped
//! 5. source or target path not valid UTF-8 → skipped, since the run log
//!    could not record the move
//! 6. otherwise a [`MoveRecord`] to a collision-free destination
//!
//! A dry run plans exactly the same records but touches nothing.

use crate::config::PathConfig;
use crate::file_organizer::{DestinationResolver, OrganizeError, OrganizeResult, ensure_dir, move_file};
use crate::rules::{extension_of, match_rule};
use crate::run_log::MoveRecord;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Why an inbox entry was not moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    Directory,
    Ignored,
    NoExtension,
    NoRule(String),
    NonUtf8Path,
    UserSkipped,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "directory"),
            Self::Ignored => write!(f, "ignored"),
            Self::NoExtension => write!(f, "no extension"),
            Self::NoRule(ext) => write!(f, "no rule for .{}", ext),
            Self::NonUtf8Path => write!(f, "path not valid UTF-8"),
            Self::UserSkipped => write!(f, "user skipped"),
        }
    }
}

/// An inbox entry that stays where it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipRecord {
    pub path: PathBuf,
    pub reason: SkipReason,
}

impl SkipRecord {
    pub fn new(path: PathBuf, reason: SkipReason) -> Self {
        Self { path, reason }
    }
}

/// Planned or performed moves plus skipped entries of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOutcome {
    pub moves: Vec<MoveRecord>,
    pub skips: Vec<SkipRecord>,
}

/// Lists the immediate entries of `dir` sorted by file name, as absolute paths.
pub fn list_entries(dir: &Path) -> OrganizeResult<Vec<PathBuf>> {
    let dir = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
    let read_failed = |source| OrganizeError::ReadDirFailed {
        path: dir.clone(),
        source,
    };

    let mut entries = fs::read_dir(&dir)
        .map_err(read_failed)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_failed)?;
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(entries)
}

/// Sorts an inbox according to a [`PathConfig`].
pub struct BatchSorter<'a> {
    config: &'a PathConfig,
    log_root: Option<PathBuf>,
}

impl<'a> BatchSorter<'a> {
    pub fn new(config: &'a PathConfig) -> Self {
        Self {
            config,
            log_root: None,
        }
    }

    /// Passes over the directory holding run logs if it sits inside the inbox.
    pub fn with_log_root(mut self, log_root: &Path) -> Self {
        self.log_root = Some(fs::canonicalize(log_root).unwrap_or_else(|_| log_root.to_path_buf()));
        self
    }

    fn holds_log_root(&self, dir: &Path) -> bool {
        match (&self.log_root, fs::canonicalize(dir)) {
            (Some(log_root), Ok(dir)) => log_root.starts_with(dir),
            _ => false,
        }
    }

    /// Plans (and unless `dry_run`, performs) the moves for `inbox`.
    pub fn sort(&self, inbox: &Path, dry_run: bool) -> OrganizeResult<SortOutcome> {
        self.sort_with(inbox, dry_run, |_| Ok::<(), OrganizeError>(()))
    }

    /// Like [`BatchSorter::sort`], calling `on_move` after every performed
    /// move. An error from `on_move` stops the batch; moves already made stay
    /// made.
    pub fn sort_with<F, E>(&self, inbox: &Path, dry_run: bool, mut on_move: F) -> Result<SortOutcome, E>
    where
        F: FnMut(&MoveRecord) -> Result<(), E>,
        E: From<OrganizeError>,
    {
        let mut outcome = SortOutcome::default();
        let mut resolver = DestinationResolver::new();

        for path in list_entries(inbox)? {
            let Some(file_name) = path.file_name().map(|n| n.to_os_string()) else {
                continue;
            };

            if path.is_dir() {
                if !self.holds_log_root(&path) {
                    outcome.skips.push(SkipRecord::new(path, SkipReason::Directory));
                }
                continue;
            }

            if self.config.filters.is_ignored(&file_name.to_string_lossy()) {
                outcome.skips.push(SkipRecord::new(path, SkipReason::Ignored));
                continue;
            }

            let Some(extension) = extension_of(&file_name) else {
                outcome.skips.push(SkipRecord::new(path, SkipReason::NoExtension));
                continue;
            };

            let Some(rule) = match_rule(&self.config.rules, &file_name) else {
                outcome.skips.push(SkipRecord::new(path, SkipReason::NoRule(extension)));
                continue;
            };

            let target_dir = self.config.target_dir(&rule.bucket, &rule.subpath);
            // Uniquified names only append ASCII, so this covers the destination too.
            if path.to_str().is_none() || target_dir.to_str().is_none() {
                tracing::warn!(path = %path.display(), "path not valid UTF-8, skipping");
                outcome.skips.push(SkipRecord::new(path, SkipReason::NonUtf8Path));
                continue;
            }
            if !dry_run {
                ensure_dir(&target_dir)?;
            }
            let destination = resolver.resolve(&target_dir, &file_name);
            let record = MoveRecord::new(path, destination, rule.name.clone());
            tracing::debug!(rule = %rule.name, src = %record.source.display(), dst = %record.destination.display(), dry_run, "planned");

            if !dry_run {
                move_file(&record.source, &record.destination)?;
                on_move(&record)?;
            }
            outcome.moves.push(record);
        }

        Ok(outcome)
    }
}
