//! Output formatting and styling module.
//!
//! All operator-facing output goes through [`OutputFormatter`], so colors and
//! wording live in one place. The sorting and undo engines never print.

use crate::run_log::MoveRecord;
use crate::sorter::SkipRecord;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Maximum number of example paths listed under the skip summary.
pub const SKIP_EXAMPLE_LIMIT: usize = 20;

/// Skipped entries grouped by reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipSummary {
    /// `(reason, count)`, most frequent first, ties by reason.
    pub groups: Vec<(String, usize)>,
    /// `(reason, path)` for the first skips, at most `limit` of them.
    pub examples: Vec<(String, String)>,
    /// Skips not shown in `examples`.
    pub remaining: usize,
    pub total: usize,
}

impl SkipSummary {
    pub fn new(skips: &[SkipRecord], limit: usize) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for skip in skips {
            *counts.entry(skip.reason.to_string()).or_insert(0) += 1;
        }

        let mut groups: Vec<(String, usize)> = counts.into_iter().collect();
        groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let examples = skips
            .iter()
            .take(limit)
            .map(|s| (s.reason.to_string(), s.path.display().to_string()))
            .collect();

        Self {
            groups,
            examples,
            remaining: skips.len().saturating_sub(limit),
            total: skips.len(),
        }
    }
}

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use parsort::output::OutputFormatter;
    /// OutputFormatter::error("No previous parsort runs found to undo");
    /// ```
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run line.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// One line per move: `<rule>: <src> -> <dst>`.
    pub fn move_line(record: &MoveRecord, dry_run: bool) {
        let line = format!(
            "{}: {} -> {}",
            record.rule_name,
            record.source.display(),
            record.destination.display()
        );
        if dry_run {
            Self::dry_run_notice(&line);
        } else {
            Self::success(&line);
        }
    }

    /// Creates a progress bar for applying confirmed moves.
    ///
    /// ```no_run
    /// use parsort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(3);
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }

    /// Prints the grouped skip reasons and a capped list of examples.
    pub fn skip_summary(skips: &[SkipRecord]) {
        if skips.is_empty() {
            return;
        }
        let summary = SkipSummary::new(skips, SKIP_EXAMPLE_LIMIT);

        Self::header("Unmatched / skipped:");
        for (reason, count) in &summary.groups {
            println!("  - {}: {}", reason, count.to_string().yellow());
        }

        Self::header("Examples:");
        for (reason, path) in &summary.examples {
            println!("  - {}: {}", reason, path);
        }
        if summary.remaining > 0 {
            println!("  ... and {} more", summary.remaining);
        }
    }
}
