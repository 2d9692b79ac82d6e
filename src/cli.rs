//! Command-line interface module for parsort.
//!
//! This module handles:
//! - Argument parsing (clap derive)
//! - Config bootstrap (`init`)
//! - Sort orchestration, automatic and guided
//! - Undo of the latest run
//!
//! Everything below [`run_cli_with_prompter`] is injected: application paths
//! come from [`AppPaths`] and operator input from a [`Prompter`].

use crate::config::{ConfigDocument, PathConfig, expand_root};
use crate::file_organizer::move_file;
use crate::guided::{GuidedSession, Prompter, StdioPrompter, guided_candidates};
use crate::output::OutputFormatter;
use crate::paths::AppPaths;
use crate::run_log::{MoveRecord, RunLog, RunLogStore};
use crate::sorter::{BatchSorter, SkipReason, SkipRecord};
use crate::undo::UndoManager;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

/// Sort an inbox folder into PARA buckets, with undo.
#[derive(Debug, Parser)]
#[command(name = "parsort", version, about)]
pub struct Cli {
    /// Directory holding run logs
    #[arg(long, global = true, env = "PARSORT_STATE_DIR", value_name = "DIR")]
    pub state_dir: Option<PathBuf>,

    /// User configuration file
    #[arg(long, global = true, env = "PARSORT_CONFIG", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn app_paths(&self) -> AppPaths {
        AppPaths::resolve(self.config_file.as_deref(), self.state_dir.as_deref())
    }
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Write a starter config file
    Init {
        /// Ask for the PARA root and bucket folder names
        #[arg(long)]
        guided: bool,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Move inbox files into PARA buckets
    Sort {
        /// Inbox folder to sort
        inbox: PathBuf,
        /// Config file to use instead of the user config
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Show what would be moved without touching anything
        #[arg(long)]
        dry_run: bool,
        /// Pick a destination for every file interactively
        #[arg(long)]
        guided: bool,
    },
    /// Undo the latest sort of an inbox
    Undo {
        /// Inbox folder whose latest run is undone
        inbox: PathBuf,
        /// Show what would be restored without touching anything
        #[arg(long)]
        dry_run: bool,
    },
}

/// Runs a command with operator input on stdin.
///
/// # Examples
///
/// ```no_run
/// use parsort::cli::{Command, run_cli};
/// use parsort::paths::AppPaths;
/// use std::path::PathBuf;
///
/// let paths = AppPaths::resolve(None, None);
/// let command = Command::Undo { inbox: PathBuf::from("/home/me/Downloads"), dry_run: true };
/// if let Err(e) = run_cli(command, &paths) {
///     eprintln!("Error: {:#}", e);
/// }
/// ```
pub fn run_cli(command: Command, paths: &AppPaths) -> Result<()> {
    run_cli_with_prompter(command, paths, &mut StdioPrompter)
}

/// Runs a command with the given operator input.
pub fn run_cli_with_prompter<P: Prompter>(command: Command, paths: &AppPaths, prompter: &mut P) -> Result<()> {
    match command {
        Command::Init { guided, force } => init_config(paths, guided, force, prompter),
        Command::Sort {
            inbox,
            config,
            dry_run,
            guided,
        } => {
            let inbox = resolve_inbox(&inbox)?;
            let config = load_config(config.as_deref(), paths)?;
            let store = RunLogStore::new(&paths.state_dir);
            if guided {
                sort_guided(&inbox, &config, &store, dry_run, prompter)
            } else {
                sort_automatic(&inbox, &config, &store, dry_run)
            }
        }
        Command::Undo { inbox, dry_run } => undo_latest(&inbox, paths, dry_run),
    }
}

fn resolve_inbox(inbox: &Path) -> Result<PathBuf> {
    let inbox = std::path::absolute(inbox)
        .with_context(|| format!("Cannot resolve inbox path {}", inbox.display()))?;
    if !inbox.is_dir() {
        bail!("Inbox is not a directory: {}", inbox.display());
    }
    Ok(inbox)
}

fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<PathConfig> {
    let config = PathConfig::load(explicit, &paths.config_file).context("Error loading configuration")?;
    for warning in &config.warnings {
        OutputFormatter::warning(&format!("Config: {}", warning));
    }
    Ok(config)
}

fn sort_automatic(inbox: &Path, config: &PathConfig, store: &RunLogStore, dry_run: bool) -> Result<()> {
    OutputFormatter::info(&format!("Sorting: {}", inbox.display()));
    let sorter = BatchSorter::new(config).with_log_root(store.root());

    if dry_run {
        let outcome = sorter.sort(inbox, true)?;
        for record in &outcome.moves {
            OutputFormatter::move_line(record, true);
        }
        OutputFormatter::dry_run_notice(&format!("would move {} file(s)", outcome.moves.len()));
        OutputFormatter::skip_summary(&outcome.skips);
        return Ok(());
    }

    let mut run = store.begin_run(inbox);
    let result = sorter.sort_with(inbox, false, |record| -> Result<()> {
        run.record(record)?;
        OutputFormatter::move_line(record, false);
        Ok(())
    });

    // Moves made before a failure must stay undoable.
    let log_path = store.commit(inbox, run).context("Failed to record run")?;
    let outcome = result?;

    OutputFormatter::success(&format!("moved {} file(s)", outcome.moves.len()));
    if let Some(log_path) = log_path {
        OutputFormatter::plain(&format!("log: {}", log_path.display()));
    }
    OutputFormatter::skip_summary(&outcome.skips);
    Ok(())
}

fn sort_guided<P: Prompter>(
    inbox: &Path,
    config: &PathConfig,
    store: &RunLogStore,
    dry_run: bool,
    prompter: &mut P,
) -> Result<()> {
    let (files, mut skips) = guided_candidates(inbox, config)?;
    if files.is_empty() {
        OutputFormatter::info(&format!("No files to place in {}", inbox.display()));
        OutputFormatter::skip_summary(&skips);
        return Ok(());
    }

    let outcome = GuidedSession::new(config, prompter)
        .dry_run(dry_run)
        .run(&files)?;
    skips.extend(outcome.skips);

    let mut run = store.begin_run(inbox);
    let moves = encode_moves(outcome.confirmed, &run, &mut skips);

    if dry_run {
        for (record, _) in &moves {
            OutputFormatter::move_line(record, true);
        }
        OutputFormatter::dry_run_notice(&format!("would move {} file(s)", moves.len()));
        OutputFormatter::skip_summary(&skips);
        return Ok(());
    }

    let result = apply_moves(&moves, &mut run);
    let log_path = store.commit(inbox, run).context("Failed to record run")?;
    result?;

    OutputFormatter::success(&format!("moved {} file(s)", moves.len()));
    if let Some(log_path) = log_path {
        OutputFormatter::plain(&format!("log: {}", log_path.display()));
    }
    OutputFormatter::skip_summary(&skips);
    Ok(())
}

/// Pairs each confirmed move with its log line. Moves the log cannot hold
/// become skips and are never performed.
fn encode_moves(
    records: Vec<MoveRecord>,
    run: &RunLog,
    skips: &mut Vec<SkipRecord>,
) -> Vec<(MoveRecord, String)> {
    let mut moves = Vec::with_capacity(records.len());
    for record in records {
        match run.encode(&record) {
            Ok(line) => moves.push((record, line)),
            Err(e) => {
                tracing::warn!(src = %record.source.display(), error = %e, "move cannot be logged, skipping");
                skips.push(SkipRecord::new(record.source, SkipReason::NonUtf8Path));
            }
        }
    }
    moves
}

/// Performs confirmed moves in order, logging each one as soon as it is done.
fn apply_moves(moves: &[(MoveRecord, String)], run: &mut RunLog) -> Result<()> {
    let pb = OutputFormatter::create_progress_bar(moves.len() as u64);

    for (record, line) in moves {
        pb.set_message(
            record
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        let moved = move_file(&record.source, &record.destination);
        if let Err(e) = moved {
            pb.abandon();
            return Err(e.into());
        }
        run.append(line)?;
        pb.suspend(|| OutputFormatter::move_line(record, false));
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(())
}

fn undo_latest(inbox: &Path, paths: &AppPaths, dry_run: bool) -> Result<()> {
    let inbox = std::path::absolute(inbox).unwrap_or_else(|_| inbox.to_path_buf());
    let store = RunLogStore::new(&paths.state_dir);
    let report = UndoManager::new(&store).undo_latest(&inbox, dry_run)?;

    for missing in &report.missing {
        OutputFormatter::warning(&format!("Missing, not restored: {}", missing.display()));
    }
    for backup in &report.backed_up {
        OutputFormatter::warning(&format!("Existing file kept as {}", backup.display()));
    }

    if dry_run {
        OutputFormatter::dry_run_notice(&format!("would undo {} move(s)", report.restored));
    } else {
        OutputFormatter::success(&format!("undid {} move(s)", report.restored));
    }
    Ok(())
}

fn init_config<P: Prompter>(paths: &AppPaths, guided: bool, force: bool, prompter: &mut P) -> Result<()> {
    let config_file = &paths.config_file;
    if config_file.exists() && !force {
        OutputFormatter::info(&format!("Config already exists: {}", config_file.display()));
        OutputFormatter::plain("Use --force to overwrite.");
        return Ok(());
    }

    let home = dirs::home_dir()
        .map(|home| home.display().to_string())
        .unwrap_or_else(|| "~".to_string());
    let mut document = ConfigDocument::default_document(&home);
    if guided {
        ask_layout(&mut document, prompter)?;
    }

    if let Some(parent) = config_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }
    fs::write(config_file, document.to_toml()?)
        .with_context(|| format!("Failed to write config {}", config_file.display()))?;

    OutputFormatter::success(&format!("Wrote config: {}", config_file.display()));
    Ok(())
}

/// Asks for the PARA root and bucket folders; Enter keeps each default.
fn ask_layout<P: Prompter>(document: &mut ConfigDocument, prompter: &mut P) -> Result<()> {
    let answer = |prompter: &mut P, label: &str, default: &str| -> Result<String> {
        let input = prompter.ask(&format!("{} [{}]: ", label, default))?;
        Ok(match input.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => default.to_string(),
        })
    };

    document.root = answer(prompter, "PARA root folder", &document.root)?;

    let keys: Vec<String> = document.buckets.keys().cloned().collect();
    for key in &keys {
        let current = document
            .buckets
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(key)
            .to_string();
        let folder = answer(prompter, &format!("Folder for {}", key), &current)?;
        document.buckets.insert(key.clone(), toml::Value::String(folder));
    }

    let root = expand_root(&document.root);
    let missing: Vec<PathBuf> = document
        .buckets
        .values()
        .filter_map(|v| v.as_str())
        .map(|folder| root.join(folder))
        .filter(|dir| !dir.exists())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    prompter.say("These folders do not exist yet:");
    for dir in &missing {
        prompter.say(&format!("  {}", dir.display()));
    }
    let create = prompter.ask("Create them now? [y/N]: ")?;
    if create.is_some_and(|a| a.trim().eq_ignore_ascii_case("y")) {
        for dir in &missing {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        OutputFormatter::success(&format!("Created {} folder(s)", missing.len()));
    }
    Ok(())
}
