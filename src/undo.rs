/// Undo functionality for reverting the latest sort run of an inbox.
///
/// Records of the latest run log are replayed in reverse order, moving each
/// file from its destination back to its source. Run logs are left untouched,
/// so undoing the same run twice finds every destination gone and restores
/// nothing the second time.
use crate::file_organizer::{OrganizeError, ensure_dir, move_file};
use crate::run_log::{MoveRecord, RunLogError, RunLogStore};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort an undo.
#[derive(Debug, Error)]
pub enum UndoError {
    #[error(transparent)]
    RunLog(#[from] RunLogError),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
}

/// Represents the result of an undo operation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct UndoReport {
    /// The run log that was replayed.
    pub log_path: PathBuf,
    /// Files moved back (or that would be, in a dry run).
    pub restored: usize,
    /// Destinations that no longer exist.
    pub missing: Vec<PathBuf>,
    /// Files found at a source path and renamed out of the way first.
    pub backed_up: Vec<PathBuf>,
    pub dry_run: bool,
}

/// Manages undo operations for sort runs.
pub struct UndoManager<'a> {
    store: &'a RunLogStore,
}

impl<'a> UndoManager<'a> {
    pub fn new(store: &'a RunLogStore) -> Self {
        Self { store }
    }

    /// Undoes the most recent run recorded for `inbox`.
    ///
    /// # Errors
    ///
    /// * [`RunLogError::NoPreviousRun`] when the inbox has no latest run.
    /// * Any move failure, after the files restored so far stay restored.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use parsort::run_log::RunLogStore;
    /// use parsort::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// let store = RunLogStore::new("/home/me/.local/state/parsort");
    /// match UndoManager::new(&store).undo_latest(Path::new("/home/me/Downloads"), false) {
    ///     Ok(report) => println!("undid {} move(s)", report.restored),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo_latest(&self, inbox: &Path, dry_run: bool) -> Result<UndoReport, UndoError> {
        let log_path = self
            .store
            .latest_run(inbox)?
            .ok_or_else(|| RunLogError::NoPreviousRun(inbox.to_path_buf()))?;
        let records = RunLogStore::read_records(&log_path)?;

        let mut report = UndoReport {
            log_path,
            dry_run,
            ..Default::default()
        };

        // Last move first, so collision chains unwind correctly.
        for record in records.iter().rev() {
            if !record.destination.exists() {
                tracing::debug!(dst = %record.destination.display(), "already gone, skipping");
                report.missing.push(record.destination.clone());
                continue;
            }

            if dry_run {
                report.restored += 1;
                continue;
            }

            if let Some(backup) = Self::restore_file(record)? {
                report.backed_up.push(backup);
            }
            report.restored += 1;
        }

        Ok(report)
    }

    /// Moves one file back, renaming anything occupying the source first.
    fn restore_file(record: &MoveRecord) -> Result<Option<PathBuf>, OrganizeError> {
        if let Some(parent) = record.source.parent() {
            ensure_dir(parent)?;
        }

        let backup = if record.source.exists() {
            let backup_path = Self::generate_backup_path(&record.source);
            move_file(&record.source, &backup_path)?;
            tracing::warn!(
                path = %record.source.display(),
                backup = %backup_path.display(),
                "source occupied, backed up"
            );
            Some(backup_path)
        } else {
            None
        };

        move_file(&record.destination, &record.source)?;
        Ok(backup)
    }

    /// Example: `file.txt` becomes `file.txt.bak.20251109-143052`
    fn generate_backup_path(original_path: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let filename = original_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        crate::file_organizer::uniquify(
            &original_path.with_file_name(format!("{}.bak.{}", filename, timestamp)),
        )
    }
}
