//! Append-only run logs and the per-inbox "latest run" pointer.
//!
//! Every sort run that moves at least one file writes
//! `<state>/runs/<inbox key>/run_<UTC stamp>.jsonl`, one [`MoveRecord`] per
//! line, and then points `latest.txt` in the same directory at it. Logs are
//! never rewritten or deleted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const LATEST_POINTER: &str = "latest.txt";

/// A single decided or performed move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    #[serde(rename = "src")]
    pub source: PathBuf,
    #[serde(rename = "dst")]
    pub destination: PathBuf,
    #[serde(rename = "rule")]
    pub rule_name: String,
}

impl MoveRecord {
    pub fn new(source: PathBuf, destination: PathBuf, rule_name: impl Into<String>) -> Self {
        Self {
            source,
            destination,
            rule_name: rule_name.into(),
        }
    }
}

/// Errors from the run log store.
#[derive(Debug, Error)]
pub enum RunLogError {
    #[error("No previous parsort runs found to undo for {}", .0.display())]
    NoPreviousRun(PathBuf),
    #[error("Run log I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed record in {} line {line}: {reason}", path.display())]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

pub type RunLogResult<T> = Result<T, RunLogError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> RunLogError + '_ {
    move |source| RunLogError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Stable key for an inbox: a short SHA-256 of its canonical path.
pub fn inbox_key(inbox: &Path) -> String {
    let resolved = fs::canonicalize(inbox)
        .or_else(|_| std::path::absolute(inbox))
        .unwrap_or_else(|_| inbox.to_path_buf());
    let digest = Sha256::digest(resolved.to_string_lossy().as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

/// Run logs for all inboxes, rooted at the application state directory.
#[derive(Debug, Clone)]
pub struct RunLogStore {
    root: PathBuf,
}

impl RunLogStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: state_dir.into(),
        }
    }

    /// The state directory everything is stored under.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the logs of one inbox.
    pub fn inbox_dir(&self, inbox: &Path) -> PathBuf {
        self.root.join("runs").join(inbox_key(inbox))
    }

    fn latest_pointer_path(&self, inbox: &Path) -> PathBuf {
        self.inbox_dir(inbox).join(LATEST_POINTER)
    }

    /// Starts a run. The log file is created on the first record, so runs
    /// that move nothing leave no trace.
    pub fn begin_run(&self, inbox: &Path) -> RunLog {
        RunLog {
            dir: self.inbox_dir(inbox),
            stamp: Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string(),
            path: None,
            writer: None,
            records: 0,
        }
    }

    /// Points the inbox's latest pointer at `run`. Does nothing for a run
    /// without records.
    pub fn commit(&self, inbox: &Path, run: RunLog) -> RunLogResult<Option<PathBuf>> {
        let Some(log_path) = run.finish()? else {
            return Ok(None);
        };

        let pointer = self.latest_pointer_path(inbox);
        let staging = pointer.with_extension("txt.tmp");
        fs::write(&staging, format!("{}\n", log_path.display())).map_err(io_error(&staging))?;
        fs::rename(&staging, &pointer).map_err(io_error(&pointer))?;

        tracing::debug!(log = %log_path.display(), "latest run updated");
        Ok(Some(log_path))
    }

    /// Path of the most recent run log for the inbox, if it still exists.
    pub fn latest_run(&self, inbox: &Path) -> RunLogResult<Option<PathBuf>> {
        let pointer = self.latest_pointer_path(inbox);
        if !pointer.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&pointer).map_err(io_error(&pointer))?;
        let log_path = PathBuf::from(content.trim());
        Ok((!content.trim().is_empty() && log_path.exists()).then_some(log_path))
    }

    /// Reads all records of a run log, in the order they were written.
    pub fn read_records(log_path: &Path) -> RunLogResult<Vec<MoveRecord>> {
        let content = fs::read_to_string(log_path).map_err(io_error(log_path))?;

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str(line).map_err(|e| RunLogError::MalformedRecord {
                    path: log_path.to_path_buf(),
                    line: index + 1,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}

/// An open run: records are appended and flushed one line at a time.
#[derive(Debug)]
pub struct RunLog {
    dir: PathBuf,
    stamp: String,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    records: usize,
}

impl RunLog {
    /// Log file path, once the first record has been written.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Appends one record as a JSON line.
    pub fn record(&mut self, record: &MoveRecord) -> RunLogResult<()> {
        let line = self.encode(record)?;
        self.append(&line)
    }

    /// Encodes a record as its log line without writing anything.
    ///
    /// Callers that move files encode first, so a record that cannot be
    /// logged never turns into a move that cannot be undone.
    pub fn encode(&self, record: &MoveRecord) -> RunLogResult<String> {
        serde_json::to_string(record).map_err(|e| RunLogError::MalformedRecord {
            path: self.path.clone().unwrap_or_else(|| self.first_path()),
            line: self.records + 1,
            reason: e.to_string(),
        })
    }

    /// Appends a line produced by [`RunLog::encode`].
    pub fn append(&mut self, line: &str) -> RunLogResult<()> {
        if self.writer.is_none() {
            self.open()?;
        }
        let path = self.path.clone().unwrap_or_default();

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line).map_err(io_error(&path))?;
            writer.flush().map_err(io_error(&path))?;
        }
        self.records += 1;
        Ok(())
    }

    fn first_path(&self) -> PathBuf {
        self.dir.join(format!("run_{}.jsonl", self.stamp))
    }

    fn open(&mut self) -> RunLogResult<()> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let mut attempt = 1;
        let (path, file) = loop {
            let path = if attempt == 1 {
                self.first_path()
            } else {
                self.dir.join(format!("run_{}-{}.jsonl", self.stamp, attempt))
            };
            match OpenOptions::new().append(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(io_error(&path)(e)),
            }
        };

        tracing::debug!(log = %path.display(), "run log opened");
        self.path = Some(path);
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    /// Flushes and closes the file, returning its path if anything was written.
    fn finish(mut self) -> RunLogResult<Option<PathBuf>> {
        if let Some(mut writer) = self.writer.take() {
            let path = self.path.clone().unwrap_or_default();
            writer.flush().map_err(io_error(&path))?;
        }
        Ok(self.path.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str) -> MoveRecord {
        MoveRecord::new(
            PathBuf::from(format!("/inbox/{}", name)),
            PathBuf::from(format!("/para/3_Resources/{}", name)),
            "Images",
        )
    }

    #[test]
    fn test_record_serializes_with_short_field_names() {
        let line = serde_json::to_string(&record("a.png")).unwrap();
        assert_eq!(
            line,
            r#"{"src":"/inbox/a.png","dst":"/para/3_Resources/a.png","rule":"Images"}"#
        );
    }

    #[test]
    fn test_inbox_key_is_stable_and_short() {
        let temp_dir = TempDir::new().unwrap();
        let key = inbox_key(temp_dir.path());
        assert_eq!(key.len(), 16);
        assert_eq!(key, inbox_key(temp_dir.path()));
        assert_ne!(key, inbox_key(&temp_dir.path().join("other")));
    }

    #[test]
    fn test_commit_writes_log_and_pointer() {
        let state = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let store = RunLogStore::new(state.path());

        let mut run = store.begin_run(inbox.path());
        run.record(&record("a.png")).unwrap();
        run.record(&record("b.png")).unwrap();
        assert_eq!(run.len(), 2);

        let log_path = store.commit(inbox.path(), run).unwrap().unwrap();
        assert_eq!(store.latest_run(inbox.path()).unwrap(), Some(log_path.clone()));

        let records = RunLogStore::read_records(&log_path).unwrap();
        assert_eq!(records, vec![record("a.png"), record("b.png")]);
    }

    #[test]
    fn test_empty_run_leaves_no_trace() {
        let state = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let store = RunLogStore::new(state.path());

        let run = store.begin_run(inbox.path());
        assert!(run.is_empty());
        assert_eq!(store.commit(inbox.path(), run).unwrap(), None);
        assert_eq!(store.latest_run(inbox.path()).unwrap(), None);
        assert!(!store.inbox_dir(inbox.path()).exists());
    }

    #[test]
    fn test_runs_never_overwrite_each_other() {
        let state = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let store = RunLogStore::new(state.path());

        let mut first = store.begin_run(inbox.path());
        first.record(&record("a.png")).unwrap();
        let first_path = store.commit(inbox.path(), first).unwrap().unwrap();

        let mut second = store.begin_run(inbox.path());
        second.record(&record("b.png")).unwrap();
        let second_path = store.commit(inbox.path(), second).unwrap().unwrap();

        assert_ne!(first_path, second_path);
        assert!(first_path.exists());
        assert_eq!(store.latest_run(inbox.path()).unwrap(), Some(second_path));
    }

    #[cfg(unix)]
    #[test]
    fn test_unencodable_record_names_run_file_and_writes_nothing() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let state = TempDir::new().unwrap();
        let inbox = TempDir::new().unwrap();
        let store = RunLogStore::new(state.path());
        let mut run = store.begin_run(inbox.path());

        let bad = MoveRecord::new(
            inbox.path().join(OsStr::from_bytes(b"bad\xff.png")),
            PathBuf::from("/para/bad.png"),
            "Images",
        );
        match run.encode(&bad) {
            Err(RunLogError::MalformedRecord { path, line, .. }) => {
                assert_eq!(line, 1);
                assert_eq!(path.parent(), Some(store.inbox_dir(inbox.path()).as_path()));
                assert!(path.to_string_lossy().ends_with(".jsonl"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
        assert!(run.record(&bad).is_err());
        assert!(run.is_empty());
        assert!(!store.inbox_dir(inbox.path()).exists());
    }

    #[test]
    fn test_malformed_line_reports_line_number() {
        let state = TempDir::new().unwrap();
        let log = state.path().join("run.jsonl");
        let good = serde_json::to_string(&record("a.png")).unwrap();
        fs::write(&log, format!("{}\n\nnot json\n", good)).unwrap();

        match RunLogStore::read_records(&log) {
            Err(RunLogError::MalformedRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected malformed record, got {:?}", other),
        }
    }
}
