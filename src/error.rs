//! Error taxonomy for planning, execution, history and undo.
//!
//! Fatal errors (`ConfigError`, `PlanError`, `HistoryError`) abort a command.
//! Per-item errors (`AccessError`, `UndoError`) are collected and reported at
//! the end. `MoveError` halts an execution but never loses completed moves.

use crate::history::Batch;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// All of these are detected before a single file is examined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// IO error while reading configuration.
    #[error("IO error reading configuration: {0}")]
    Io(String),
    /// Invalid glob pattern provided.
    #[error("invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern provided.
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// A policy value that is not one of the known names.
    #[error("unknown {kind} policy '{value}' (expected one of: {expected})")]
    UnknownPolicy {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },
    /// A size string that could not be parsed.
    #[error("invalid size '{input}': {reason}")]
    InvalidSize { input: String, reason: String },
    /// `size_min` is larger than `size_max`.
    #[error("invalid size range: minimum ({min} bytes) is larger than maximum ({max} bytes)")]
    InvertedSizeBounds { min: u64, max: u64 },
    /// The same extension is claimed by two categories.
    #[error("extension '{extension}' is listed in both '{first}' and '{second}'")]
    DuplicateExtension {
        extension: String,
        first: String,
        second: String,
    },
    /// A configured category reuses the reserved fallback name.
    #[error("category '{0}' is reserved for unmatched extensions")]
    ReservedCategory(String),
    /// A category name that cannot be used as a single directory component.
    #[error("invalid category name '{0}'")]
    InvalidCategoryName(String),
}

/// A single file or directory that could not be read.
///
/// Never fatal on its own: the entry is skipped, logged, and listed in the
/// command summary. Stored as text so plans stay comparable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot access {}: {reason}", .path.display())]
pub struct AccessError {
    pub path: PathBuf,
    pub reason: String,
}

impl AccessError {
    pub fn new(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Fatal errors while building a plan.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The directory to organize cannot be walked at all.
    #[error("root directory is not accessible: {0}")]
    RootInaccessible(AccessError),
    /// No free name was found for a colliding destination.
    #[error("no free name for {} after {attempts} attempts", .path.display())]
    RenameExhausted { path: PathBuf, attempts: u32 },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A single move that could not be applied.
#[derive(Debug, Error)]
pub enum MoveError {
    #[error("source {} no longer exists", .0.display())]
    SourceMissing(PathBuf),
    #[error("destination {} is already occupied", .0.display())]
    DestinationOccupied(PathBuf),
    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to move {} to {}: {source}", .from.display(), .to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    /// A cross-device copy whose size did not match the original.
    #[error(
        "copy of {} to {} is incomplete ({copied} of {expected} bytes); source kept",
        .from.display(),
        .to.display()
    )]
    VerificationFailed {
        from: PathBuf,
        to: PathBuf,
        expected: u64,
        copied: u64,
    },
}

/// Errors reading or writing the batch history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("no history found at {}", .0.display())]
    Missing(PathBuf),
    #[error("history at {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("failed to read history at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write history at {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
    #[error("batch {0} not found in history")]
    UnknownBatch(u64),
    #[error("batch {0} has already been undone")]
    AlreadyUndone(u64),
}

/// One move that could not be reversed during undo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UndoError {
    #[error("{} is missing; it was moved or deleted after the batch ran", .0.display())]
    DestinationMissing(PathBuf),
    #[error("{} is occupied by another file", .0.display())]
    SourceOccupied(PathBuf),
    #[error("failed to restore {} to {}: {reason}", .from.display(), .to.display())]
    Io {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
}

/// Outcome of an execution that did not finish.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// A move failed. Every move completed before it is recorded in `batch`,
    /// which has already been appended to history when present.
    #[error("execution stopped after {completed} move(s): {source}")]
    Interrupted {
        completed: usize,
        batch: Option<Box<Batch>>,
        source: MoveError,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Top-level error used by the command layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Execute(#[from] ExecuteError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
