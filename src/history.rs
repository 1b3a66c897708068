//! Persistent batch history.
//!
//! Every executed run or merge is appended as one [`Batch`] to a
//! pretty-printed JSON log, by default `.dirtidy_history.json` in the
//! organized directory. The log is rewritten through a temporary file in the
//! same directory and renamed into place, so it stays parseable after every
//! append even if the process dies mid-write.
//!
//! Batches are never removed. Undo marks a batch consumed by setting
//! `undone_at`; [`HistoryStore::last`] skips consumed batches.
//!
//! One process at a time: there is no locking between concurrent writers.

use crate::error::HistoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::{debug, info};

/// File name of the log inside the organized directory.
pub const HISTORY_FILE_NAME: &str = ".dirtidy_history.json";

/// Name prefix of the temporary file a write goes through. Discovery never
/// yields files with this prefix, even if a crash left one behind.
pub const HISTORY_TEMP_PREFIX: &str = ".dirtidy_history.json.";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Run,
    Merge,
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchKind::Run => f.write_str("run"),
            BatchKind::Merge => f.write_str("merge"),
        }
    }
}

/// One applied move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub moved: usize,
    pub renamed: usize,
    pub skipped_duplicates: usize,
    pub skipped_collisions: usize,
    pub bytes: u64,
}

/// The record of one executed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Assigned by [`HistoryStore::append`]; zero before that.
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub kind: BatchKind,
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    /// Moves in the order they were applied.
    pub moves: Vec<MoveRecord>,
    /// Directories created by the executor, outermost first.
    #[serde(default)]
    pub created_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub stats: BatchStats,
    /// False when execution stopped early.
    pub complete: bool,
    #[serde(default)]
    pub undone_at: Option<DateTime<Utc>>,
    /// Indices into `moves` already put back by an earlier, partial undo.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restored: Vec<usize>,
}

impl Batch {
    pub fn new(kind: BatchKind, source_root: PathBuf, target_root: PathBuf) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            kind,
            source_root,
            target_root,
            moves: Vec::new(),
            created_dirs: Vec::new(),
            stats: BatchStats::default(),
            complete: true,
            undone_at: None,
            restored: Vec::new(),
        }
    }

    pub fn is_restored(&self, index: usize) -> bool {
        self.restored.contains(&index)
    }

    pub fn is_undone(&self) -> bool {
        self.undone_at.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    version: u32,
    next_id: u64,
    batches: Vec<Batch>,
}

impl Default for HistoryFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            next_id: 1,
            batches: Vec::new(),
        }
    }
}

/// Handle on one history log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The default log for an organized directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `batch`, assigning it the next id. Returns the stored batch.
    ///
    /// A missing log is created. A corrupt log is left untouched and
    /// reported.
    pub fn append(&self, mut batch: Batch) -> Result<Batch, HistoryError> {
        let mut file = self.read()?.unwrap_or_default();
        batch.id = file.next_id;
        file.next_id += 1;
        file.batches.push(batch.clone());
        self.write(&file)?;
        info!(
            id = batch.id,
            kind = %batch.kind,
            moves = batch.moves.len(),
            complete = batch.complete,
            "batch recorded"
        );
        Ok(batch)
    }

    /// Most recent batch that has not been undone.
    ///
    /// # Errors
    ///
    /// `HistoryError::Missing` when the log does not exist, and
    /// `HistoryError::Corrupt` when it cannot be parsed.
    pub fn last(&self) -> Result<Option<Batch>, HistoryError> {
        let file = self.read_existing()?;
        Ok(file.batches.into_iter().rev().find(|b| !b.is_undone()))
    }

    /// All batches, newest first.
    pub fn list(&self) -> Result<Vec<Batch>, HistoryError> {
        let mut batches = self.read_existing()?.batches;
        batches.reverse();
        Ok(batches)
    }

    /// Fails when an existing log cannot be read or parsed. A missing log is
    /// fine; it is created on the first append.
    pub fn check(&self) -> Result<(), HistoryError> {
        self.read().map(|_| ())
    }

    /// Marks batch `id` consumed.
    pub fn mark_undone(&self, id: u64) -> Result<(), HistoryError> {
        let mut file = self.read_existing()?;
        let batch = file
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(HistoryError::UnknownBatch(id))?;
        if batch.is_undone() {
            return Err(HistoryError::AlreadyUndone(id));
        }
        batch.undone_at = Some(Utc::now());
        self.write(&file)?;
        debug!(id, "batch marked undone");
        Ok(())
    }

    /// Remembers that the moves at `indices` of batch `id` were put back,
    /// so a later undo of the same batch does not try them again.
    pub fn record_restored(&self, id: u64, indices: &[usize]) -> Result<(), HistoryError> {
        let mut file = self.read_existing()?;
        let batch = file
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(HistoryError::UnknownBatch(id))?;
        if batch.is_undone() {
            return Err(HistoryError::AlreadyUndone(id));
        }
        for &index in indices {
            if index < batch.moves.len() && !batch.restored.contains(&index) {
                batch.restored.push(index);
            }
        }
        batch.restored.sort_unstable();
        let restored = batch.restored.len();
        self.write(&file)?;
        debug!(id, restored, "restore progress recorded");
        Ok(())
    }

    fn read_existing(&self) -> Result<HistoryFile, HistoryError> {
        self.read()?
            .ok_or_else(|| HistoryError::Missing(self.path.clone()))
    }

    fn read(&self) -> Result<Option<HistoryFile>, HistoryError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(HistoryError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file: HistoryFile =
            serde_json::from_str(&content).map_err(|e| HistoryError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        if file.version != FORMAT_VERSION {
            return Err(HistoryError::Corrupt {
                path: self.path.clone(),
                reason: format!("unsupported version {}", file.version),
            });
        }
        Ok(Some(file))
    }

    fn write(&self, file: &HistoryFile) -> Result<(), HistoryError> {
        let write_error = |reason: String| HistoryError::Write {
            path: self.path.clone(),
            reason,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| write_error(e.to_string()))?;

        let json = serde_json::to_string_pretty(file).map_err(|e| write_error(e.to_string()))?;
        let mut temp = Builder::new()
            .prefix(HISTORY_TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&parent)
            .map_err(|e| write_error(e.to_string()))?;
        temp.write_all(json.as_bytes())
            .and_then(|()| temp.write_all(b"\n"))
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| write_error(e.to_string()))?;
        temp.persist(&self.path)
            .map_err(|e| write_error(e.error.to_string()))?;
        Ok(())
    }
}
