/// Plan execution.
///
/// [`FileOrganizer`] applies the moving entries of a [`Plan`] one at a time,
/// in plan order. Each completed move is recorded immediately; if a move
/// fails, the moves completed so far are written to history as a partial
/// batch before the error is returned, so everything that happened can be
/// undone.
///
/// Files are never overwritten: a destination that became occupied after
/// planning stops the run.
use crate::error::{ExecuteError, MoveError};
use crate::history::{Batch, BatchKind, HistoryStore, MoveRecord};
use crate::plan::{ActionKind, Plan, PlanEntry};
use indicatif::ProgressBar;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Moves a single file without overwriting anything.
///
/// Uses a rename when source and destination share a filesystem. Otherwise
/// the file is copied, the copy's size is checked against the source, and
/// only then is the source removed. A failed check removes the copy and
/// keeps the source.
///
/// # Arguments
///
/// * `from` - Existing file to move
/// * `to` - Destination path, whose parent directory must exist
///
/// # Examples
///
/// ```no_run
/// use dirtidy::file_organizer::move_file;
/// use std::path::Path;
///
/// match move_file(Path::new("/data/photo.jpg"), Path::new("/data/media/photo.jpg")) {
///     Ok(()) => println!("moved"),
///     Err(e) => eprintln!("Move failed: {}", e),
/// }
/// ```
pub fn move_file(from: &Path, to: &Path) -> Result<(), MoveError> {
    if fs::symlink_metadata(from).is_err() {
        return Err(MoveError::SourceMissing(from.to_path_buf()));
    }
    if fs::symlink_metadata(to).is_ok() {
        return Err(MoveError::DestinationOccupied(to.to_path_buf()));
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!(from = %from.display(), to = %to.display(), "cross-device move, copying");
            copy_then_remove(from, to)
        }
        Err(source) => Err(MoveError::Io {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}

fn is_cross_device(error: &std::io::Error) -> bool {
    // EXDEV is 18 on Linux and macOS.
    error.kind() == ErrorKind::CrossesDevices || error.raw_os_error() == Some(18)
}

fn copy_then_remove(from: &Path, to: &Path) -> Result<(), MoveError> {
    let io_error = |source| MoveError::Io {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let expected = fs::metadata(from).map_err(io_error)?.len();
    let copied = match fs::copy(from, to) {
        Ok(copied) => copied,
        Err(e) => {
            let _ = fs::remove_file(to);
            return Err(io_error(e));
        }
    };
    let on_disk = fs::metadata(to).map(|m| m.len()).unwrap_or(0);

    if copied != expected || on_disk != expected {
        let _ = fs::remove_file(to);
        return Err(MoveError::VerificationFailed {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            expected,
            copied: on_disk,
        });
    }

    if let Err(e) = fs::remove_file(from) {
        let _ = fs::remove_file(to);
        return Err(io_error(e));
    }
    Ok(())
}

/// Creates the missing ancestors of `dir`, outermost first, and returns the
/// ones it created.
fn create_missing_dirs(dir: &Path) -> Result<Vec<PathBuf>, MoveError> {
    let missing: Vec<&Path> = dir
        .ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .collect();

    let mut created = Vec::with_capacity(missing.len());
    for path in missing.into_iter().rev() {
        match fs::create_dir(path) {
            Ok(()) => created.push(path.to_path_buf()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(source) => {
                remove_empty_dirs(&created);
                return Err(MoveError::CreateDir {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
    }
    Ok(created)
}

/// Removes `dirs` deepest first, skipping any that are not empty.
pub(crate) fn remove_empty_dirs(dirs: &[PathBuf]) -> usize {
    let mut removed = 0;
    for dir in dirs.iter().rev() {
        match fs::remove_dir(dir) {
            Ok(()) => removed += 1,
            Err(e) => debug!(path = %dir.display(), error = %e, "directory left in place"),
        }
    }
    removed
}

/// Applies plans and records them in history.
pub struct FileOrganizer {
    progress: ProgressBar,
}

impl Default for FileOrganizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FileOrganizer {
    /// An organizer without visible progress.
    pub fn new() -> Self {
        Self {
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports each applied move on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Applies every moving entry of `plan` and appends the batch to
    /// `history`.
    ///
    /// # Returns
    ///
    /// The stored batch, or `None` when the plan moved nothing (no batch is
    /// recorded then).
    ///
    /// # Errors
    ///
    /// `ExecuteError::Interrupted` when a move fails. Moves completed before
    /// the failure are in the returned partial batch, already stored.
    /// `ExecuteError::History` when the existing log is unreadable, checked
    /// before anything moves, or when the batch cannot be written.
    pub fn execute(
        &self,
        plan: &Plan,
        kind: BatchKind,
        history: &HistoryStore,
    ) -> Result<Option<Batch>, ExecuteError> {
        history.check()?;

        let mut batch = Batch::new(
            kind,
            plan.source_root().to_path_buf(),
            plan.target_root().to_path_buf(),
        );
        batch.stats.skipped_duplicates = plan.stats().skipped_duplicates;
        batch.stats.skipped_collisions = plan.stats().skipped_collisions;

        self.progress.set_length(plan.stats().planned_moves() as u64);
        for entry in plan.moves() {
            if let Err(source) = self.apply(entry, &mut batch) {
                self.progress.abandon();
                warn!(
                    source = %entry.source.display(),
                    error = %source,
                    completed = batch.moves.len(),
                    "execution stopped"
                );
                return Err(self.interrupt(batch, source, history));
            }
            self.progress.inc(1);
        }
        self.progress.finish_and_clear();

        if batch.moves.is_empty() {
            info!("nothing to move, no batch recorded");
            return Ok(None);
        }
        let stored = history.append(batch)?;
        info!(id = stored.id, moves = stored.moves.len(), "execution finished");
        Ok(Some(stored))
    }

    fn apply(&self, entry: &PlanEntry, batch: &mut Batch) -> Result<(), MoveError> {
        if let Some(parent) = entry.destination.parent() {
            batch.created_dirs.extend(create_missing_dirs(parent)?);
        }
        move_file(&entry.source, &entry.destination)?;

        batch.moves.push(MoveRecord {
            source: entry.source.clone(),
            destination: entry.destination.clone(),
        });
        match entry.action {
            ActionKind::RenameOnCollision => batch.stats.renamed += 1,
            _ => batch.stats.moved += 1,
        }
        batch.stats.bytes += entry.size;
        debug!(
            from = %entry.source.display(),
            to = %entry.destination.display(),
            "moved"
        );
        Ok(())
    }

    fn interrupt(
        &self,
        mut batch: Batch,
        source: MoveError,
        history: &HistoryStore,
    ) -> ExecuteError {
        let completed = batch.moves.len();
        if completed == 0 {
            remove_empty_dirs(&batch.created_dirs);
            return ExecuteError::Interrupted {
                completed,
                batch: None,
                source,
            };
        }

        batch.complete = false;
        match history.append(batch) {
            Ok(stored) => ExecuteError::Interrupted {
                completed,
                batch: Some(Box::new(stored)),
                source,
            },
            Err(e) => ExecuteError::History(e),
        }
    }
}
