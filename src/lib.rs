//! parsort - sort an inbox folder into PARA buckets, with undo
//!
//! This library provides rule-based sorting of an inbox into the Projects /
//! Areas / Resources / Archive layout, a guided mode where the operator picks
//! every destination, and a per-inbox run log that lets the latest run be
//! undone.

pub mod cli;
pub mod config;
pub mod file_organizer;
pub mod guided;
pub mod output;
pub mod paths;
pub mod rules;
pub mod run_log;
pub mod sorter;
pub mod undo;

pub use config::{BucketMap, ConfigDocument, ConfigError, PathConfig};
pub use file_organizer::{DestinationResolver, OrganizeError};
pub use guided::{GuidedOutcome, GuidedSession, Prompter};
pub use paths::AppPaths;
pub use rules::{Rule, match_rule};
pub use run_log::{MoveRecord, RunLogError, RunLogStore};
pub use sorter::{BatchSorter, SkipReason, SkipRecord, SortOutcome};
pub use undo::{UndoManager, UndoReport};

pub use cli::{Command, run_cli, run_cli_with_prompter};
