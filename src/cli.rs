//! Command-line interface module for dirtidy.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing (clap derive)
//! - Configuration loading and per-invocation overrides
//! - Dispatching to the planner, executor, undo engine and history store
//! - Rendering results through [`OutputFormatter`]

use crate::config::{Config, Overrides};
use crate::error::{Error, ExecuteError, HistoryError, Result};
use crate::file_organizer::FileOrganizer;
use crate::history::{Batch, BatchKind, HISTORY_FILE_NAME, HistoryStore};
use crate::output::{DEFAULT_MAX_ROWS, OutputFormatter};
use crate::plan::Plan;
use crate::planner::{PlanRequest, build_plan};
use crate::undo::{UndoManager, UndoReport};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

/// Sort files into category folders, with previews and undo.
#[derive(Debug, Parser)]
#[command(name = "dirtidy", version, about)]
pub struct Cli {
    /// Configuration file (defaults to .dirtidyrc.toml, then ~/.config/dirtidy/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// History file (defaults to .dirtidy_history.json in the target directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub history: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log every planning decision to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Also write a daily log file to this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show what `run` would do, without touching anything
    Preview {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
        /// Number of plan rows to print
        #[arg(long, default_value_t = DEFAULT_MAX_ROWS)]
        max_rows: usize,
    },
    /// Organize a directory and record the batch for undo
    Run {
        #[arg(default_value = ".")]
        path: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Revert the most recent batch
    Undo {
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Move the contents of SRC into DEST, keeping relative paths
    Merge {
        source: PathBuf,
        dest: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Check the configuration and list its categories
    ValidateConfig,
    /// List recorded batches
    History {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

/// Flags that override the configuration for one plan.
#[derive(Debug, Clone, Default, Args)]
pub struct PlanArgs {
    /// Only plan these extensions (comma separated)
    #[arg(long = "only-ext", value_delimiter = ',', value_name = "EXT")]
    pub only_ext: Option<Vec<String>>,

    /// Skip files smaller than this, e.g. 10KB
    #[arg(long, value_name = "SIZE")]
    pub size_min: Option<String>,

    /// Skip files larger than this, e.g. 2GB
    #[arg(long, value_name = "SIZE")]
    pub size_max: Option<String>,

    /// rename | keep-newest | skip
    #[arg(long, value_name = "POLICY")]
    pub collision: Option<String>,

    /// off | skip | keep-newest | rename
    #[arg(long, value_name = "POLICY")]
    pub dedupe: Option<String>,

    /// Add a date folder: none | created | modified
    #[arg(long = "by-date", value_name = "SOURCE")]
    pub by_date: Option<String>,

    /// year | month | day
    #[arg(long, value_name = "GRANULARITY")]
    pub granularity: Option<String>,

    /// Only plan files in these categories (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "NAME")]
    pub categories: Option<Vec<String>>,
}

impl PlanArgs {
    pub fn to_overrides(&self) -> Overrides {
        Overrides {
            only_extensions: self.only_ext.clone(),
            size_min: self.size_min.clone(),
            size_max: self.size_max.clone(),
            collision: self.collision.clone(),
            dedupe: self.dedupe.clone(),
            date_partition: self.by_date.clone(),
            date_granularity: self.granularity.clone(),
            categories: self.categories.clone(),
        }
    }
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganizeCommand {
    /// Build and print the plan. Nothing is written.
    Preview { max_rows: usize },
    /// Organize the directory in place.
    Run,
    /// Undo the most recent batch.
    Undo,
    /// Move the directory's contents into `dest`.
    Merge { dest: PathBuf },
    ValidateConfig,
    History,
}

/// A fully parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub command: OrganizeCommand,
    /// Directory the command operates on (the merge source for `Merge`).
    pub path: PathBuf,
    pub config: Option<PathBuf>,
    pub history: Option<PathBuf>,
    pub overrides: Overrides,
    /// Ask on stdin before run, merge or undo change anything. Off unless
    /// set, so library callers never block on a prompt.
    pub confirm: bool,
}

impl Invocation {
    pub fn new(command: OrganizeCommand, path: impl Into<PathBuf>) -> Self {
        Self {
            command,
            path: path.into(),
            config: None,
            history: None,
            overrides: Overrides::default(),
            confirm: false,
        }
    }

    pub fn with_config(mut self, config: Option<PathBuf>) -> Self {
        self.config = config;
        self
    }

    pub fn with_history(mut self, history: Option<PathBuf>) -> Self {
        self.history = history;
        self
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_confirmation(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    /// Directory whose history log the command reads or appends to.
    fn target_dir(&self) -> &Path {
        match &self.command {
            OrganizeCommand::Merge { dest } => dest,
            _ => &self.path,
        }
    }

    fn history_store(&self) -> HistoryStore {
        match &self.history {
            Some(path) => HistoryStore::new(path),
            None => HistoryStore::new(self.target_dir().join(HISTORY_FILE_NAME)),
        }
    }
}

impl Cli {
    pub fn into_invocation(self) -> Invocation {
        let (command, path, overrides, confirm) = match self.command {
            Command::Preview {
                path,
                plan,
                max_rows,
            } => (
                OrganizeCommand::Preview { max_rows },
                path,
                plan.to_overrides(),
                false,
            ),
            Command::Run { path, plan, yes } => {
                (OrganizeCommand::Run, path, plan.to_overrides(), !yes)
            }
            Command::Undo { path, yes } => (OrganizeCommand::Undo, path, Overrides::default(), !yes),
            Command::Merge {
                source,
                dest,
                plan,
                yes,
            } => (
                OrganizeCommand::Merge { dest },
                source,
                plan.to_overrides(),
                !yes,
            ),
            Command::ValidateConfig => (
                OrganizeCommand::ValidateConfig,
                PathBuf::from("."),
                Overrides::default(),
                false,
            ),
            Command::History { path } => {
                (OrganizeCommand::History, path, Overrides::default(), false)
            }
        };

        Invocation::new(command, path)
            .with_config(self.config)
            .with_history(self.history)
            .with_overrides(overrides)
            .with_confirmation(confirm)
    }
}

/// What a command produced, for callers that inspect results.
#[derive(Debug)]
pub enum Outcome {
    Previewed(Plan),
    Executed { plan: Plan, batch: Option<Batch> },
    Undone(Option<UndoReport>),
    /// The user declined the confirmation prompt; nothing changed.
    Cancelled,
    Validated { categories: Vec<String> },
    Listed(Vec<Batch>),
}

impl Outcome {
    /// False when the command finished but some entries failed.
    pub fn is_success(&self) -> bool {
        match self {
            Outcome::Undone(Some(report)) => report.is_complete_success(),
            _ => true,
        }
    }
}

/// Runs the CLI application with the given command and directory path.
///
/// Uses the default configuration lookup and history location.
///
/// # Examples
///
/// ```no_run
/// use dirtidy::cli::{run_cli, OrganizeCommand};
/// use std::path::Path;
///
/// match run_cli(OrganizeCommand::Run, Path::new("/path/to/directory")) {
///     Ok(_) => println!("Operation completed successfully"),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(command: OrganizeCommand, dir_path: &Path) -> Result<Outcome> {
    run_cli_with_config(command, dir_path, None)
}

/// Runs the CLI application with an optional configuration file.
///
/// # Arguments
///
/// * `command` - The command to execute
/// * `dir_path` - The directory path to operate on
/// * `config_path` - Optional path to configuration file
pub fn run_cli_with_config(
    command: OrganizeCommand,
    dir_path: &Path,
    config_path: Option<&Path>,
) -> Result<Outcome> {
    run(&Invocation::new(command, dir_path).with_config(config_path.map(Path::to_path_buf)))
}

/// Executes one invocation and prints its result.
///
/// # Errors
///
/// Fatal errors only: configuration, planning, history access, or an
/// execution that stopped on a failed move. Per-entry undo failures are
/// reported in the returned [`Outcome`].
pub fn run(invocation: &Invocation) -> Result<Outcome> {
    match &invocation.command {
        OrganizeCommand::Preview { max_rows } => {
            let plan = plan_for(invocation)?;
            OutputFormatter::dry_run_notice("No files will be moved.");
            OutputFormatter::render_plan(&plan, *max_rows);
            Ok(Outcome::Previewed(plan))
        }
        OrganizeCommand::Run => execute(invocation, BatchKind::Run),
        OrganizeCommand::Merge { .. } => execute(invocation, BatchKind::Merge),
        OrganizeCommand::Undo => {
            let store = invocation.history_store();
            if invocation.confirm
                && let Some(batch) = store.last()?
                && !OutputFormatter::confirm(&format!(
                    "Undo batch {} ({} from {})?",
                    batch.id,
                    plural_moves(batch.moves.len()),
                    batch.created_at.format("%Y-%m-%d %H:%M")
                ))
            {
                return Ok(cancelled());
            }
            let report = UndoManager::undo_last(&store)?;
            OutputFormatter::undo_report(report.as_ref());
            Ok(Outcome::Undone(report))
        }
        OrganizeCommand::ValidateConfig => {
            let settings = Config::load(invocation.config.as_deref())?.validate()?;
            OutputFormatter::category_listing(&settings.categories);
            Ok(Outcome::Validated {
                categories: settings.categories.names().map(String::from).collect(),
            })
        }
        OrganizeCommand::History => {
            let store = invocation.history_store();
            let batches = match store.list() {
                Ok(batches) => batches,
                Err(HistoryError::Missing(_)) => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            OutputFormatter::history_listing(&batches);
            Ok(Outcome::Listed(batches))
        }
    }
}

fn plan_for(invocation: &Invocation) -> Result<Plan> {
    let settings = Config::load(invocation.config.as_deref())?.resolve(&invocation.overrides)?;
    let store = invocation.history_store();
    let request = match &invocation.command {
        OrganizeCommand::Merge { dest } => PlanRequest::merge(&invocation.path, dest),
        _ => PlanRequest::organize(&invocation.path),
    };
    Ok(build_plan(&settings, &request.ignoring(store.path()))?)
}

fn execute(invocation: &Invocation, kind: BatchKind) -> Result<Outcome> {
    let plan = plan_for(invocation)?;
    let store = invocation.history_store();
    OutputFormatter::info(&format!(
        "{} {} -> {}",
        if kind == BatchKind::Merge { "Merging" } else { "Organizing" },
        plan.source_root().display(),
        plan.target_root().display()
    ));
    OutputFormatter::plan_summary(&plan);

    let planned = plan.stats().planned_moves();
    if invocation.confirm
        && planned > 0
        && !OutputFormatter::confirm(&format!("Apply {}?", plural_moves(planned)))
    {
        return Ok(cancelled());
    }

    let progress = OutputFormatter::create_progress_bar(plan.stats().planned_moves() as u64);
    let result = FileOrganizer::new()
        .with_progress(progress)
        .execute(&plan, kind, &store);

    if let Err(ExecuteError::Interrupted {
        completed, batch, ..
    }) = &result
    {
        OutputFormatter::interrupted_report(*completed, batch.as_deref());
    }
    let batch = result.map_err(Error::from)?;
    OutputFormatter::execution_report(batch.as_ref());
    info!(kind = %kind, recorded = batch.is_some(), "command finished");
    Ok(Outcome::Executed { plan, batch })
}

fn cancelled() -> Outcome {
    OutputFormatter::info("Cancelled. Nothing was changed.");
    info!("command cancelled at the prompt");
    Outcome::Cancelled
}

fn plural_moves(count: usize) -> String {
    format!("{} {}", count, if count == 1 { "move" } else { "moves" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_preview_with_overrides() {
        let cli = Cli::try_parse_from([
            "dirtidy",
            "preview",
            "/tmp/downloads",
            "--only-ext",
            "jpg,png",
            "--size-min",
            "10KB",
            "--collision",
            "skip",
            "--by-date",
            "modified",
            "--granularity",
            "day",
            "--categories",
            "media",
            "--max-rows",
            "5",
        ])
        .expect("Failed to parse arguments");

        let invocation = cli.into_invocation();
        assert_eq!(invocation.command, OrganizeCommand::Preview { max_rows: 5 });
        assert_eq!(invocation.path, PathBuf::from("/tmp/downloads"));
        assert_eq!(
            invocation.overrides.only_extensions,
            Some(vec!["jpg".to_string(), "png".to_string()])
        );
        assert_eq!(invocation.overrides.size_min.as_deref(), Some("10KB"));
        assert_eq!(invocation.overrides.collision.as_deref(), Some("skip"));
        assert_eq!(invocation.overrides.date_partition.as_deref(), Some("modified"));
        assert_eq!(invocation.overrides.date_granularity.as_deref(), Some("day"));
        assert_eq!(
            invocation.overrides.categories,
            Some(vec!["media".to_string()])
        );
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["dirtidy", "run"]).unwrap();
        assert!(!cli.verbose);
        let invocation = cli.into_invocation();
        assert_eq!(invocation.command, OrganizeCommand::Run);
        assert_eq!(invocation.path, PathBuf::from("."));
        assert_eq!(invocation.overrides, Overrides::default());

        let cli = Cli::try_parse_from(["dirtidy", "preview"]).unwrap();
        assert_eq!(
            cli.into_invocation().command,
            OrganizeCommand::Preview {
                max_rows: DEFAULT_MAX_ROWS
            }
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dirtidy",
            "undo",
            "/data",
            "--history",
            "/logs/h.json",
            "--debug",
        ])
        .unwrap();
        assert!(cli.debug);
        let invocation = cli.into_invocation();
        assert_eq!(invocation.history, Some(PathBuf::from("/logs/h.json")));
    }

    #[test]
    fn test_merge_history_lives_in_destination() {
        let cli = Cli::try_parse_from(["dirtidy", "merge", "/a", "/b"]).unwrap();
        let invocation = cli.into_invocation();
        assert_eq!(invocation.path, PathBuf::from("/a"));
        assert_eq!(
            invocation.history_store().path(),
            Path::new("/b").join(HISTORY_FILE_NAME)
        );
    }

    #[test]
    fn test_changing_commands_confirm_unless_yes() {
        for args in [
            vec!["dirtidy", "run"],
            vec!["dirtidy", "undo"],
            vec!["dirtidy", "merge", "/a", "/b"],
        ] {
            let invocation = Cli::try_parse_from(args.iter().copied()).unwrap().into_invocation();
            assert!(invocation.confirm, "{args:?} should ask first");
        }
        for args in [
            vec!["dirtidy", "run", "-y"],
            vec!["dirtidy", "undo", "--yes"],
            vec!["dirtidy", "merge", "/a", "/b", "-y"],
        ] {
            let invocation = Cli::try_parse_from(args.iter().copied()).unwrap().into_invocation();
            assert!(!invocation.confirm, "{args:?} should not ask");
        }
        for args in [vec!["dirtidy", "preview"], vec!["dirtidy", "history"]] {
            let invocation = Cli::try_parse_from(args.iter().copied()).unwrap().into_invocation();
            assert!(!invocation.confirm);
        }
        assert!(Cli::try_parse_from(["dirtidy", "preview", "--yes"]).is_err());
    }

    #[test]
    fn test_library_invocations_never_prompt() {
        assert!(!Invocation::new(OrganizeCommand::Run, "/data").confirm);
        assert!(
            Invocation::new(OrganizeCommand::Undo, "/data")
                .with_confirmation(true)
                .confirm
        );
    }

    #[test]
    fn test_unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["dirtidy", "organize"]).is_err());
        assert!(Cli::try_parse_from(["dirtidy", "merge", "/only-one"]).is_err());
    }

    #[test]
    fn test_history_without_log_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let outcome = run_cli(OrganizeCommand::History, temp_dir.path()).unwrap();
        assert!(matches!(outcome, Outcome::Listed(ref batches) if batches.is_empty()));
    }

    #[test]
    fn test_run_then_undo() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("song.mp3"), "mp3").unwrap();

        let outcome = run_cli(OrganizeCommand::Run, temp_dir.path()).unwrap();
        assert!(matches!(outcome, Outcome::Executed { batch: Some(_), .. }));
        assert!(temp_dir.path().join("media").join("song.mp3").exists());

        let outcome = run_cli(OrganizeCommand::Undo, temp_dir.path()).unwrap();
        assert!(outcome.is_success());
        assert!(temp_dir.path().join("song.mp3").exists());
    }

    #[test]
    fn test_explicit_missing_config_is_fatal() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let err = run_cli_with_config(
            OrganizeCommand::Preview { max_rows: 10 },
            temp_dir.path(),
            Some(&temp_dir.path().join("absent.toml")),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
