//! Guided placement: an interactive, per-file state machine.
//!
//! For every file the matched rule is offered as a suggestion only. The
//! operator picks a bucket, then walks the directory tree below it to choose
//! the final folder:
//!
//! ```text
//! Start -> BucketChoice -> FolderNavigation -> Confirmed
//!               |                 |
//!               +--> Skipped <----+
//!               +--> Quit    <----+
//! ```
//!
//! `Quit` ends the whole batch. Files confirmed before it are kept; the file
//! being decided is dropped without a record.

use crate::config::PathConfig;
use crate::file_organizer::{DestinationResolver, OrganizeError, ensure_dir};
use crate::rules::{Rule, match_rule};
use crate::run_log::MoveRecord;
use crate::sorter::{SkipReason, SkipRecord, list_entries};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Rule name logged when the operator chose something other than the
/// suggestion.
pub const GUIDED_RULE: &str = "guided";

const SEPARATOR: &str = "--------------------------------------------------";

#[derive(Debug, Error)]
pub enum GuidedError {
    #[error("Failed to read operator input: {0}")]
    Prompt(#[from] io::Error),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
}

/// Operator I/O used by the guided engine.
pub trait Prompter {
    /// Shows one line of text.
    fn say(&mut self, line: &str);

    /// Shows `prompt` and reads one line, without the trailing newline.
    /// `None` means the input is exhausted.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Prompter over the process's stdin and stdout.
#[derive(Debug, Default)]
pub struct StdioPrompter;

impl Prompter for StdioPrompter {
    fn say(&mut self, line: &str) {
        println!("{}", line);
    }

    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Tagged result of one interactive step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Continue(T),
    Skip,
    Quit,
}

/// Parsed answer at the bucket menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketInput {
    Chosen(String),
    Skip,
    Quit,
    Invalid(&'static str),
}

/// Interprets one line typed at the bucket menu.
///
/// Empty input accepts the suggestion, if there is one.
pub fn parse_bucket_input(input: &str, menu: &[&str], suggested: Option<&str>) -> BucketInput {
    let choice = input.trim().to_lowercase();
    match choice.as_str() {
        "q" => BucketInput::Quit,
        "s" => BucketInput::Skip,
        "" => match suggested {
            Some(bucket) => BucketInput::Chosen(bucket.to_string()),
            None => BucketInput::Invalid("No suggestion available. Choose a bucket number, s, or q."),
        },
        number => match number.parse::<usize>() {
            Ok(index) if (1..=menu.len()).contains(&index) => {
                BucketInput::Chosen(menu[index - 1].to_string())
            }
            _ => BucketInput::Invalid("Invalid input. Use Enter, a bucket number, s, or q."),
        },
    }
}

/// Result of one navigation command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavInput {
    Moved,
    Accept(PathBuf),
    Skip,
    Quit,
    Invalid,
}

/// Interactive directory tree walk.
#[derive(Debug, Clone)]
pub struct Navigator {
    current: PathBuf,
    subdirs: Vec<PathBuf>,
}

impl Navigator {
    pub fn new(start: PathBuf) -> Self {
        let subdirs = list_subdirs(&start);
        Self {
            current: start,
            subdirs,
        }
    }

    pub fn current(&self) -> &Path {
        &self.current
    }

    /// Subdirectories of the current folder, sorted case-insensitively.
    pub fn subdirs(&self) -> &[PathBuf] {
        &self.subdirs
    }

    fn enter(&mut self, dir: PathBuf) {
        self.subdirs = list_subdirs(&dir);
        self.current = dir;
    }

    /// Applies one line of input.
    ///
    /// Enter accepts the current folder, a number descends, `b` goes up
    /// (never past the filesystem root), `s` skips the file, `q` quits.
    pub fn apply(&mut self, input: &str) -> NavInput {
        let choice = input.trim().to_lowercase();
        match choice.as_str() {
            "" => NavInput::Accept(self.current.clone()),
            "s" => NavInput::Skip,
            "q" => NavInput::Quit,
            "b" => {
                if let Some(parent) = self.current.parent().map(Path::to_path_buf) {
                    self.enter(parent);
                }
                NavInput::Moved
            }
            number => match number.parse::<usize>() {
                Ok(index) if (1..=self.subdirs.len()).contains(&index) => {
                    let dir = self.subdirs[index - 1].clone();
                    self.enter(dir);
                    NavInput::Moved
                }
                _ => NavInput::Invalid,
            },
        }
    }
}

/// Lists subdirectories; unreadable folders list as empty.
fn list_subdirs(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() == io::ErrorKind::PermissionDenied {
                tracing::warn!(dir = %dir.display(), "permission denied listing directory");
            } else {
                tracing::debug!(dir = %dir.display(), error = %e, "cannot list directory");
            }
            return Vec::new();
        }
    };

    let mut subdirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort_by_key(|path| {
        path.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    subdirs
}

/// Files offered in guided mode: regular files of the inbox in name order.
/// Files matching `[filters]` or with a non-UTF-8 path come back as skips.
pub fn guided_candidates(
    inbox: &Path,
    config: &PathConfig,
) -> Result<(Vec<PathBuf>, Vec<SkipRecord>), OrganizeError> {
    let mut files = Vec::new();
    let mut skips = Vec::new();

    for path in list_entries(inbox)? {
        if !path.is_file() {
            continue;
        }
        let ignored = path
            .file_name()
            .is_some_and(|name| config.filters.is_ignored(&name.to_string_lossy()));
        if ignored {
            skips.push(SkipRecord::new(path, SkipReason::Ignored));
        } else if path.to_str().is_none() {
            skips.push(SkipRecord::new(path, SkipReason::NonUtf8Path));
        } else {
            files.push(path);
        }
    }

    Ok((files, skips))
}

/// Decision for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Confirmed(MoveRecord),
    Skipped(SkipRecord),
    Quit,
}

/// Confirmed moves and skips of a guided batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuidedOutcome {
    pub confirmed: Vec<MoveRecord>,
    pub skips: Vec<SkipRecord>,
    /// True if the operator quit before the last file.
    pub quit: bool,
}

enum FileState {
    BucketChoice,
    FolderNavigation(Navigator),
    Confirmed(PathBuf),
    Skipped,
    Quit,
}

/// Runs guided placement over a list of files.
pub struct GuidedSession<'a, P: Prompter> {
    config: &'a PathConfig,
    prompter: &'a mut P,
    resolver: DestinationResolver,
    dry_run: bool,
}

impl<'a, P: Prompter> GuidedSession<'a, P> {
    pub fn new(config: &'a PathConfig, prompter: &'a mut P) -> Self {
        Self {
            config,
            prompter,
            resolver: DestinationResolver::new(),
            dry_run: false,
        }
    }

    /// In a dry run no bucket directories are created while browsing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Asks about each file in turn until the list ends or the operator quits.
    pub fn run(&mut self, files: &[PathBuf]) -> Result<GuidedOutcome, GuidedError> {
        let mut outcome = GuidedOutcome::default();

        for file in files {
            match self.place_file(file)? {
                Placement::Confirmed(record) => outcome.confirmed.push(record),
                Placement::Skipped(skip) => outcome.skips.push(skip),
                Placement::Quit => {
                    self.prompter.say("Quit.");
                    outcome.quit = true;
                    break;
                }
            }
        }

        Ok(outcome)
    }

    /// Drives one file from `BucketChoice` to a final state.
    pub fn place_file(&mut self, file: &Path) -> Result<Placement, GuidedError> {
        let file_name = file
            .file_name()
            .ok_or_else(|| OrganizeError::MissingFileName(file.to_path_buf()))?;
        let config = self.config;
        let rule = match_rule(&config.rules, file_name);

        self.show_file(file, rule);

        let mut state = FileState::BucketChoice;
        loop {
            state = match state {
                FileState::BucketChoice => match self.choose_bucket(rule)? {
                    Step::Continue(bucket) => {
                        FileState::FolderNavigation(Navigator::new(self.start_dir(&bucket, rule)?))
                    }
                    Step::Skip => FileState::Skipped,
                    Step::Quit => FileState::Quit,
                },
                FileState::FolderNavigation(navigator) => match self.navigate(navigator)? {
                    Step::Continue(dir) => FileState::Confirmed(dir),
                    Step::Skip => FileState::Skipped,
                    Step::Quit => FileState::Quit,
                },
                FileState::Confirmed(dir) => {
                    let destination = self.resolver.resolve(&dir, file_name);
                    let suggested_dir = rule.map(|r| config.target_dir(&r.bucket, &r.subpath));
                    let rule_name = match rule {
                        Some(rule) if suggested_dir.as_deref() == Some(dir.as_path()) => {
                            rule.name.clone()
                        }
                        _ => GUIDED_RULE.to_string(),
                    };
                    return Ok(Placement::Confirmed(MoveRecord::new(
                        file.to_path_buf(),
                        destination,
                        rule_name,
                    )));
                }
                FileState::Skipped => {
                    return Ok(Placement::Skipped(SkipRecord::new(
                        file.to_path_buf(),
                        SkipReason::UserSkipped,
                    )));
                }
                FileState::Quit => return Ok(Placement::Quit),
            };
        }
    }

    fn show_file(&mut self, file: &Path, rule: Option<&Rule>) {
        let suggested = rule
            .map(Rule::label)
            .unwrap_or_else(|| "(no suggestion)".to_string());

        self.prompter.say("");
        self.prompter.say(SEPARATOR);
        self.prompter.say(&format!(
            "File: {}",
            file.file_name().unwrap_or_default().to_string_lossy()
        ));
        self.prompter.say(&format!("From: {}", file.display()));
        self.prompter.say(&format!("Suggested: {}", suggested));
    }

    fn choose_bucket(&mut self, rule: Option<&Rule>) -> Result<Step<String>, GuidedError> {
        let config = self.config;
        let menu = config.buckets.menu_order();
        for (i, key) in menu.iter().enumerate() {
            let folder = config.buckets.get(key).unwrap_or_default();
            self.prompter.say(&format!("  {}) {} ({})", i + 1, key, folder));
        }
        self.prompter.say("  s) skip file");
        self.prompter.say("  q) quit run");
        self.prompter.say("  Enter = accept suggested bucket (if any)");

        loop {
            let Some(input) = self.prompter.ask("> ")? else {
                return Ok(Step::Quit);
            };
            match parse_bucket_input(&input, &menu, rule.map(|r| r.bucket.as_str())) {
                BucketInput::Chosen(bucket) => return Ok(Step::Continue(bucket)),
                BucketInput::Skip => return Ok(Step::Skip),
                BucketInput::Quit => return Ok(Step::Quit),
                BucketInput::Invalid(hint) => self.prompter.say(hint),
            }
        }
    }

    /// The chosen bucket's directory, or the suggested subfolder when the
    /// suggestion's bucket was chosen and that folder already exists.
    fn start_dir(&self, bucket: &str, rule: Option<&Rule>) -> Result<PathBuf, GuidedError> {
        let bucket_dir = self.config.bucket_dir(bucket);
        if !self.dry_run {
            ensure_dir(&bucket_dir)?;
        }

        if let Some(rule) = rule.filter(|r| r.bucket == bucket && !r.subpath.is_empty()) {
            let suggested = self.config.target_dir(&rule.bucket, &rule.subpath);
            if suggested.is_dir() {
                return Ok(suggested);
            }
        }
        Ok(bucket_dir)
    }

    fn navigate(&mut self, mut navigator: Navigator) -> Result<Step<PathBuf>, GuidedError> {
        loop {
            self.show_folder(&navigator);

            let Some(input) = self.prompter.ask("> ")? else {
                return Ok(Step::Quit);
            };
            match navigator.apply(&input) {
                NavInput::Accept(dir) => return Ok(Step::Continue(dir)),
                NavInput::Skip => return Ok(Step::Skip),
                NavInput::Quit => return Ok(Step::Quit),
                NavInput::Moved => {}
                NavInput::Invalid => self
                    .prompter
                    .say("Invalid input. Use Enter, a number, b, s, or q."),
            }
        }
    }

    fn show_folder(&mut self, navigator: &Navigator) {
        self.prompter.say("");
        self.prompter.say(SEPARATOR);
        self.prompter
            .say(&format!("Current: {}", navigator.current().display()));
        if navigator.subdirs().is_empty() {
            self.prompter.say("  (no subfolders)");
        }
        for (i, dir) in navigator.subdirs().iter().enumerate() {
            self.prompter.say(&format!(
                "  {}) {}/",
                i + 1,
                dir.file_name().unwrap_or_default().to_string_lossy()
            ));
        }
        self.prompter.say("");
        self.prompter.say("Enter = choose this folder");
        self.prompter.say("b = back, s = skip, q = quit");
    }
}
