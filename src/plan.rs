//! The plan model: an ordered, immutable list of proposed actions.

use crate::error::AccessError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// What the executor will do with one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Move,
    SkipDuplicate,
    SkipCollision,
    RenameOnCollision,
}

impl ActionKind {
    /// Whether the executor moves the file.
    pub fn is_move(&self) -> bool {
        matches!(self, ActionKind::Move | ActionKind::RenameOnCollision)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Move => "MOVE",
            ActionKind::SkipDuplicate => "SKIP_DUPLICATE",
            ActionKind::SkipCollision => "SKIP_COLLISION",
            ActionKind::RenameOnCollision => "RENAME",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One proposed action.
///
/// For skipped entries `destination` is where the file would have gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub category: String,
    pub action: ActionKind,
    pub size: u64,
    /// Human readable reason for anything other than a plain move.
    pub rationale: Option<String>,
    /// The kept file, for `SkipDuplicate`.
    pub duplicate_of: Option<PathBuf>,
}

/// Aggregate counts, kept up to date while the plan is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanStats {
    /// Files moved into each category.
    pub per_category: BTreeMap<String, usize>,
    /// Bytes the executor will move.
    pub total_bytes: u64,
    pub moves: usize,
    pub renames: usize,
    pub skipped_duplicates: usize,
    pub skipped_collisions: usize,
}

impl PlanStats {
    pub(crate) fn record(&mut self, entry: &PlanEntry) {
        match entry.action {
            ActionKind::Move => self.moves += 1,
            ActionKind::RenameOnCollision => self.renames += 1,
            ActionKind::SkipDuplicate => self.skipped_duplicates += 1,
            ActionKind::SkipCollision => self.skipped_collisions += 1,
        }
        if entry.action.is_move() {
            *self.per_category.entry(entry.category.clone()).or_default() += 1;
            self.total_bytes += entry.size;
        }
    }

    pub(crate) fn retract(&mut self, entry: &PlanEntry) {
        match entry.action {
            ActionKind::Move => self.moves -= 1,
            ActionKind::RenameOnCollision => self.renames -= 1,
            ActionKind::SkipDuplicate => self.skipped_duplicates -= 1,
            ActionKind::SkipCollision => self.skipped_collisions -= 1,
        }
        if entry.action.is_move() {
            if let Some(count) = self.per_category.get_mut(&entry.category) {
                *count -= 1;
                if *count == 0 {
                    self.per_category.remove(&entry.category);
                }
            }
            self.total_bytes -= entry.size;
        }
    }

    /// Entries the executor will apply.
    pub fn planned_moves(&self) -> usize {
        self.moves + self.renames
    }

    pub fn total_entries(&self) -> usize {
        self.planned_moves() + self.skipped_duplicates + self.skipped_collisions
    }
}

/// How destinations are laid out under the target root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `<target>/<category>[/<date>]/<file name>`.
    Categorized,
    /// `<target>/<path relative to the source root>`.
    Mirrored,
}

/// A finished plan. Built by the planner, then rendered or executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    source_root: PathBuf,
    target_root: PathBuf,
    layout: Layout,
    entries: Vec<PlanEntry>,
    stats: PlanStats,
    access_errors: Vec<AccessError>,
    skipped_symlinks: Vec<PathBuf>,
}

impl Plan {
    pub(crate) fn new(
        source_root: PathBuf,
        target_root: PathBuf,
        layout: Layout,
        entries: Vec<PlanEntry>,
        stats: PlanStats,
        access_errors: Vec<AccessError>,
        skipped_symlinks: Vec<PathBuf>,
    ) -> Self {
        Self {
            source_root,
            target_root,
            layout,
            entries,
            stats,
            access_errors,
            skipped_symlinks,
        }
    }

    /// Entries in discovery order.
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    /// Entries the executor will apply, in order.
    pub fn moves(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action.is_move())
    }

    pub fn stats(&self) -> &PlanStats {
        &self.stats
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Files and directories that could not be read while planning.
    pub fn access_errors(&self) -> &[AccessError] {
        &self.access_errors
    }

    pub fn skipped_symlinks(&self) -> &[PathBuf] {
        &self.skipped_symlinks
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
