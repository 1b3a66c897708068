/// Undo functionality for reverting executed batches.
///
/// A batch is replayed in reverse order, moving each file from its recorded
/// destination back to its original path. Entries that cannot be restored
/// are reported and the rest are still attempted. The batch is marked as
/// undone only when every entry was restored. After a partial undo the
/// entries that did make it back are recorded in history, so a retry only
/// replays the rest.
use crate::error::{HistoryError, MoveError, UndoError};
use crate::file_organizer::{move_file, remove_empty_dirs};
use crate::history::{Batch, HistoryStore, MoveRecord};
use std::fs;
use tracing::{debug, info, warn};

/// Represents the result of an undo operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoReport {
    /// Batch that was replayed.
    pub batch_id: u64,
    /// Number of files moved back to their original location.
    pub restored: usize,
    /// Entries skipped because an earlier attempt already restored them.
    pub previously_restored: usize,
    /// Indices into the batch's moves restored by this attempt.
    pub restored_moves: Vec<usize>,
    /// Entries that could not be restored, in the order they were attempted.
    pub failures: Vec<(MoveRecord, UndoError)>,
    /// Directories created by the batch that were removed again.
    pub removed_dirs: usize,
    /// Whether the batch was marked as undone in history.
    pub consumed: bool,
}

impl UndoReport {
    fn new(batch_id: u64) -> Self {
        Self {
            batch_id,
            restored: 0,
            previously_restored: 0,
            restored_moves: Vec::new(),
            failures: Vec::new(),
            removed_dirs: 0,
            consumed: false,
        }
    }

    /// Returns true if every entry was restored.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Manages undo operations for executed batches.
pub struct UndoManager;

impl UndoManager {
    /// Undoes the most recent batch that has not been undone yet.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when every recorded batch has already been undone.
    ///
    /// # Errors
    ///
    /// `HistoryError::Missing` when there is no history file and
    /// `HistoryError::Corrupt` when it cannot be parsed. Failures on single
    /// entries are not errors; they are listed in the report.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dirtidy::history::HistoryStore;
    /// use dirtidy::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// let store = HistoryStore::in_dir(Path::new("/path/to/directory"));
    /// match UndoManager::undo_last(&store) {
    ///     Ok(Some(report)) => println!("Restored {} files", report.restored),
    ///     Ok(None) => println!("Nothing to undo"),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo_last(history: &HistoryStore) -> Result<Option<UndoReport>, HistoryError> {
        let Some(batch) = history.last()? else {
            info!(path = %history.path().display(), "no batch left to undo");
            return Ok(None);
        };

        let mut report = Self::undo_batch(&batch);
        if report.is_complete_success() {
            history.mark_undone(batch.id)?;
            report.consumed = true;
            info!(id = batch.id, restored = report.restored, "batch undone");
        } else {
            if !report.restored_moves.is_empty() {
                history.record_restored(batch.id, &report.restored_moves)?;
            }
            warn!(
                id = batch.id,
                failed = report.failures.len(),
                "undo incomplete, batch kept for retry"
            );
        }
        Ok(Some(report))
    }

    /// Replays `batch` in reverse without touching history.
    ///
    /// Moves listed in `batch.restored` are skipped. Directories the batch
    /// created are removed afterwards when they are empty again, and only
    /// when every entry was restored.
    pub fn undo_batch(batch: &Batch) -> UndoReport {
        let mut report = UndoReport::new(batch.id);

        for (index, record) in batch.moves.iter().enumerate().rev() {
            if batch.is_restored(index) {
                report.previously_restored += 1;
                continue;
            }
            match Self::restore(record) {
                Ok(()) => {
                    report.restored += 1;
                    report.restored_moves.push(index);
                    debug!(
                        from = %record.destination.display(),
                        to = %record.source.display(),
                        "restored"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "cannot restore file");
                    report.failures.push((record.clone(), e));
                }
            }
        }

        if report.is_complete_success() {
            report.removed_dirs = remove_empty_dirs(&batch.created_dirs);
        }
        report
    }

    fn restore(record: &MoveRecord) -> Result<(), UndoError> {
        if fs::symlink_metadata(&record.destination).is_err() {
            return Err(UndoError::DestinationMissing(record.destination.clone()));
        }
        if fs::symlink_metadata(&record.source).is_ok() {
            return Err(UndoError::SourceOccupied(record.source.clone()));
        }
        if let Some(parent) = record.source.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| io_failure(record, e))?;
        }

        move_file(&record.destination, &record.source).map_err(|e| match e {
            MoveError::SourceMissing(path) => UndoError::DestinationMissing(path),
            MoveError::DestinationOccupied(path) => UndoError::SourceOccupied(path),
            other => UndoError::Io {
                from: record.destination.clone(),
                to: record.source.clone(),
                reason: other.to_string(),
            },
        })
    }
}

fn io_failure(record: &MoveRecord, error: std::io::Error) -> UndoError {
    UndoError::Io {
        from: record.destination.clone(),
        to: record.source.clone(),
        reason: error.to_string(),
    }
}
