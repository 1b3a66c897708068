//! Output formatting and styling module.
//!
//! Provides a centralized interface for all terminal output: colored status
//! lines, the execution progress bar, plan tables and the summaries printed
//! after each command. Engine modules never print; they log through
//! `tracing` and hand their results here.

use crate::file_category::CategoryMap;
use crate::history::Batch;
use crate::plan::{ActionKind, Plan, PlanEntry};
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

/// Default number of plan rows shown by `preview`.
pub const DEFAULT_MAX_ROWS: usize = 50;

/// Formats a byte count with decimal units, e.g. `1.5 MB`.
///
/// # Examples
///
/// ```
/// use dirtidy::output::format_bytes;
/// assert_eq!(format_bytes(999), "999 B");
/// assert_eq!(format_bytes(1_500_000), "1.5 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1000 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = UNITS[0];
    for candidate in UNITS {
        value /= 1000.0;
        unit = candidate;
        if value < 1000.0 {
            break;
        }
    }
    format!("{:.1} {}", value, unit)
}

/// Shows `path` relative to `root` when it lies below it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn plural(count: usize, one: &str, many: &str) -> String {
    format!("{} {}", count, if count == 1 { one } else { many })
}

fn action_cell(action: ActionKind) -> ColoredString {
    let label = format!("{:<14}", action.label());
    match action {
        ActionKind::Move => label.green(),
        ActionKind::RenameOnCollision => label.cyan(),
        ActionKind::SkipDuplicate | ActionKind::SkipCollision => label.yellow(),
    }
}

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - The execution progress bar
/// - Plan tables and summaries
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirtidy::output::OutputFormatter;
    /// OutputFormatter::success("Moved 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, on stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates the progress bar shown while a plan is executed.
    ///
    /// # Arguments
    ///
    /// * `total` - Number of moves in the plan
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirtidy::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress bar template")
                .progress_chars("█▓░"),
        );
        pb
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Asks a yes/no question on stdin. Anything but `y` or `yes` is a no,
    /// including end of input.
    pub fn confirm(question: &str) -> bool {
        Self::confirm_from(&mut io::stdin().lock(), question)
    }

    pub fn confirm_from(input: &mut impl BufRead, question: &str) -> bool {
        print!("{} {} ", question.bold(), "[y/N]".dimmed());
        let _ = io::stdout().flush();

        let mut answer = String::new();
        match input.read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }

    /// Prints the plan as a table, at most `max_rows` entries, followed by
    /// the plan summary.
    pub fn render_plan(plan: &Plan, max_rows: usize) {
        Self::header(&format!(
            "PLAN  {} -> {}",
            plan.source_root().display(),
            plan.target_root().display()
        ));

        if plan.is_empty() {
            Self::plain("Nothing to do.");
        } else {
            Self::plan_table(plan, max_rows);
        }
        Self::plan_summary(plan);
    }

    fn plan_table(plan: &Plan, max_rows: usize) {
        let shown: Vec<&PlanEntry> = plan.entries().iter().take(max_rows).collect();
        let rows: Vec<(String, String)> = shown
            .iter()
            .map(|entry| {
                (
                    display_path(&entry.source, plan.source_root()),
                    display_path(&entry.destination, plan.target_root()),
                )
            })
            .collect();
        let source_width = rows.iter().map(|(s, _)| s.len()).max().unwrap_or(0).max(6);
        let dest_width = rows.iter().map(|(_, d)| d.len()).max().unwrap_or(0).max(11);
        let category_width = shown
            .iter()
            .map(|e| e.category.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:>4}  {:<14} {:<sw$}  {:<dw$}  {:<cw$}  {}",
            "#".bold(),
            "Action".bold(),
            "Source".bold(),
            "Destination".bold(),
            "Category".bold(),
            "Rationale".bold(),
            sw = source_width,
            dw = dest_width,
            cw = category_width,
        );
        println!(
            "{}",
            "-".repeat(4 + 2 + 14 + 1 + source_width + 2 + dest_width + 2 + category_width + 11)
        );
        for (index, (entry, (source, destination))) in shown.iter().zip(&rows).enumerate() {
            println!(
                "{:>4}  {} {:<sw$}  {:<dw$}  {:<cw$}  {}",
                index + 1,
                action_cell(entry.action),
                source,
                destination,
                entry.category,
                entry.rationale.as_deref().unwrap_or("").dimmed(),
                sw = source_width,
                dw = dest_width,
                cw = category_width,
            );
        }

        let hidden = plan.entries().len().saturating_sub(max_rows);
        if hidden > 0 {
            Self::plain(&format!(
                "... {} more (use --max-rows to show more)",
                plural(hidden, "entry", "entries")
            ));
        }
    }

    /// Prints counts by category and by action, total bytes, and any files
    /// that could not be read or were skipped as symlinks.
    pub fn plan_summary(plan: &Plan) {
        let stats = plan.stats();
        Self::category_table(&stats.per_category, stats.planned_moves());

        Self::header("BY ACTION");
        let actions = [
            (ActionKind::Move, stats.moves),
            (ActionKind::RenameOnCollision, stats.renames),
            (ActionKind::SkipDuplicate, stats.skipped_duplicates),
            (ActionKind::SkipCollision, stats.skipped_collisions),
        ];
        for (action, count) in actions {
            println!("{} {}", action_cell(action), count);
        }
        println!(
            "{:<14} {}",
            "Bytes to move".bold(),
            format_bytes(stats.total_bytes).green()
        );

        Self::plan_problems(plan);
    }

    fn plan_problems(plan: &Plan) {
        if !plan.access_errors().is_empty() {
            Self::warning(&format!(
                "{} could not be read and were skipped:",
                plural(plan.access_errors().len(), "path", "paths")
            ));
            for error in plan.access_errors() {
                Self::plain(&format!("  - {}", error));
            }
        }
        if !plan.skipped_symlinks().is_empty() {
            Self::info(&format!(
                "{} not followed",
                plural(plan.skipped_symlinks().len(), "symlink", "symlinks")
            ));
        }
    }

    /// Prints a table of file counts per category.
    pub fn category_table(category_counts: &BTreeMap<String, usize>, total_files: usize) {
        Self::header("SUMMARY");

        let max_category_len = category_counts
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in category_counts {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                if *count == 1 { "file" } else { "files" },
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total_files.to_string().green().bold(),
            if total_files == 1 { "file" } else { "files" },
            width = max_category_len
        );
    }

    /// Prints the result of a run or merge.
    pub fn execution_report(batch: Option<&Batch>) {
        let Some(batch) = batch else {
            Self::info("Nothing was moved; no batch recorded.");
            return;
        };
        let stats = &batch.stats;
        Self::success(&format!(
            "Batch {} ({}): moved {}, renamed {}, {}",
            batch.id,
            batch.kind,
            plural(stats.moved, "file", "files"),
            stats.renamed,
            format_bytes(stats.bytes)
        ));
        if stats.skipped_duplicates + stats.skipped_collisions > 0 {
            Self::plain(&format!(
                "Skipped {} duplicate(s) and {} collision(s)",
                stats.skipped_duplicates, stats.skipped_collisions
            ));
        }
        Self::plain(&format!("Undo with: dirtidy undo {}", batch.target_root.display()));
    }

    /// Prints what an interrupted execution left behind.
    pub fn interrupted_report(completed: usize, batch: Option<&Batch>) {
        match batch {
            Some(batch) => Self::warning(&format!(
                "{} completed before the failure and recorded as batch {}; `undo` reverses them",
                plural(completed, "move", "moves"),
                batch.id
            )),
            None => Self::warning("No file was moved."),
        }
    }

    pub fn undo_report(report: Option<&UndoReport>) {
        let Some(report) = report else {
            Self::info("Nothing to undo: every recorded batch has been undone.");
            return;
        };

        if report.is_complete_success() {
            Self::success(&format!(
                "Undid batch {}: restored {}",
                report.batch_id,
                plural(report.restored, "file", "files")
            ));
            if report.previously_restored > 0 {
                Self::plain(&format!(
                    "{} already restored by an earlier attempt",
                    plural(report.previously_restored, "file was", "files were")
                ));
            }
            if report.removed_dirs > 0 {
                Self::plain(&format!(
                    "Removed {}",
                    plural(report.removed_dirs, "empty directory", "empty directories")
                ));
            }
            return;
        }

        Self::warning(&format!(
            "Batch {} partially undone: restored {}, {} failed",
            report.batch_id,
            plural(report.restored, "file", "files"),
            report.failures.len()
        ));
        for (record, error) in &report.failures {
            Self::plain(&format!("  - {}: {}", record.destination.display(), error));
        }
        Self::plain("The batch was kept in history; fix the entries above and run undo again.");
    }

    /// Prints recorded batches, newest first.
    pub fn history_listing(batches: &[Batch]) {
        Self::header("HISTORY");
        if batches.is_empty() {
            Self::plain("No batches recorded.");
            return;
        }
        for batch in batches {
            let state = match (&batch.undone_at, batch.complete) {
                (Some(at), _) => format!("undone {}", at.format("%Y-%m-%d %H:%M:%S")).dimmed(),
                (None, false) => "partial".yellow(),
                (None, true) => "active".green(),
            };
            println!(
                "{:>4}  {}  {:<5}  {:>4} moves  {}  {}",
                batch.id,
                batch.created_at.format("%Y-%m-%d %H:%M:%S"),
                batch.kind.to_string(),
                batch.moves.len(),
                state,
                batch.target_root.display()
            );
        }
    }

    /// Prints the categories of a validated configuration.
    pub fn category_listing(categories: &CategoryMap) {
        Self::success("Configuration is valid");
        Self::header("CATEGORIES");
        for category in categories.categories() {
            let extensions: Vec<&str> = category.extensions().iter().map(String::as_str).collect();
            println!("{:<14} {}", category.name().bold(), extensions.join(" "));
        }
        println!(
            "{:<14} {}",
            categories.fallback().bold(),
            "(everything else)".dimmed()
        );
    }
}
