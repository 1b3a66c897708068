//! Plan construction.
//!
//! [`PlanBuilder`] consumes discovered files one at a time, in discovery
//! order, and decides for each one where it goes and whether it moves at
//! all. Decisions are order dependent: the first file to claim a destination
//! or a digest keeps it unless a `keep-newest` policy hands it to a newer
//! file, in which case the earlier entry is rewritten in place. Entries live
//! in an arena indexed by position, with a map from claimed destination to
//! arena slot, and are frozen into a [`Plan`] by [`PlanBuilder::finish`].
//!
//! The builder never writes to the filesystem. It stats destinations and
//! reads file contents for hashing, nothing else.

use crate::config::Settings;
use crate::discovery::{Discovered, Discovery, DiscoveryOptions, FileRecord};
use crate::error::{AccessError, PlanError};
use crate::hasher::ContentHasher;
use crate::plan::{ActionKind, Layout, Plan, PlanEntry, PlanStats};
use crate::policy::{CollisionPolicy, DedupePolicy};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::{debug, info};

/// Upper bound on ` (N)` suffixes tried for one colliding name.
pub const MAX_RENAME_ATTEMPTS: u32 = 9999;

static NUMBERED_STEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.*) \((?P<n>\d+)\)$").expect("Invalid rename suffix pattern")
});

/// What to plan: which tree, where it goes, and how it is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub source_root: PathBuf,
    pub target_root: PathBuf,
    pub layout: Layout,
    /// Files never planned, such as the history log.
    pub ignore_files: Vec<PathBuf>,
}

impl PlanRequest {
    /// Sort `root` into category folders inside itself.
    pub fn organize(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            source_root: root.clone(),
            target_root: root,
            layout: Layout::Categorized,
            ignore_files: Vec::new(),
        }
    }

    /// Move everything under `source` to the same relative path under
    /// `destination`.
    pub fn merge(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source.into(),
            target_root: destination.into(),
            layout: Layout::Mirrored,
            ignore_files: Vec::new(),
        }
    }

    pub fn ignoring(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignore_files.push(path.into());
        self
    }
}

/// Walks the request's source tree and builds a plan.
///
/// # Errors
///
/// `PlanError::RootInaccessible` when the source root cannot be listed, and
/// `PlanError::RenameExhausted` when no free name is left for a collision.
/// Unreadable entries below the root are collected in the plan instead.
pub fn build_plan(settings: &Settings, request: &PlanRequest) -> Result<Plan, PlanError> {
    let target_root = std::path::absolute(&request.target_root)
        .map_err(|e| PlanError::RootInaccessible(AccessError::new(&request.target_root, e)))?;
    let ignore_files = request
        .ignore_files
        .iter()
        .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()))
        .collect();

    let mut skip_dirs = Vec::new();
    if request.layout == Layout::Mirrored
        && let Ok(source) = std::path::absolute(&request.source_root)
        && target_root != source
        && target_root.starts_with(&source)
    {
        skip_dirs.push(target_root.clone());
    }

    let discovery = Discovery::new(
        &request.source_root,
        DiscoveryOptions {
            recursive: settings.recursive,
            ignore_files,
            skip_dirs,
        },
    )
    .map_err(PlanError::RootInaccessible)?;

    let mut builder = PlanBuilder::new(
        settings,
        discovery.root().to_path_buf(),
        target_root,
        request.layout,
    );
    for item in discovery {
        match item {
            Discovered::File(record) => builder.push(record)?,
            Discovered::Symlink(path) => builder.note_symlink(path),
            Discovered::Inaccessible(err) => builder.note_access_error(err),
        }
    }

    let plan = builder.finish();
    info!(
        source = %plan.source_root().display(),
        target = %plan.target_root().display(),
        moves = plan.stats().planned_moves(),
        skipped = plan.stats().skipped_duplicates + plan.stats().skipped_collisions,
        "plan built"
    );
    Ok(plan)
}

struct Slot {
    entry: PlanEntry,
    modified: SystemTime,
}

/// Mutable, in-progress plan.
pub struct PlanBuilder<'a> {
    settings: &'a Settings,
    source_root: PathBuf,
    target_root: PathBuf,
    layout: Layout,
    max_rename_attempts: u32,
    hasher: ContentHasher,
    slots: Vec<Slot>,
    /// Destination → slot currently moving there.
    claims: HashMap<PathBuf, usize>,
    /// Size → slots that were moving when indexed.
    by_size: HashMap<u64, Vec<usize>>,
    /// Sources of slots that are moving.
    moving_sources: HashSet<PathBuf>,
    /// Regular files already present in each destination directory.
    listings: HashMap<PathBuf, Vec<(PathBuf, u64)>>,
    stats: PlanStats,
    access_errors: Vec<AccessError>,
    skipped_symlinks: Vec<PathBuf>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(
        settings: &'a Settings,
        source_root: PathBuf,
        target_root: PathBuf,
        layout: Layout,
    ) -> Self {
        Self {
            settings,
            source_root,
            target_root,
            layout,
            max_rename_attempts: MAX_RENAME_ATTEMPTS,
            hasher: ContentHasher::new(),
            slots: Vec::new(),
            claims: HashMap::new(),
            by_size: HashMap::new(),
            moving_sources: HashSet::new(),
            listings: HashMap::new(),
            stats: PlanStats::default(),
            access_errors: Vec::new(),
            skipped_symlinks: Vec::new(),
        }
    }

    #[cfg(test)]
    fn with_rename_limit(mut self, limit: u32) -> Self {
        self.max_rename_attempts = limit;
        self
    }

    /// Plans one discovered file.
    ///
    /// Filtered files, files outside the requested categories and files that
    /// are already where they belong leave no entry at all.
    pub fn push(&mut self, record: FileRecord) -> Result<(), PlanError> {
        if !self.settings.filter.accepts(&record, &self.source_root) {
            debug!(path = %record.path().display(), "filtered out");
            return Ok(());
        }

        let category = self
            .settings
            .categories
            .classify(record.extension())
            .to_string();
        if !self.settings.wants(&category) {
            debug!(path = %record.path().display(), %category, "category not requested");
            return Ok(());
        }

        let destination = self.destination_for(&record, &category);
        if destination == record.path() {
            debug!(path = %record.path().display(), "already in place");
            return Ok(());
        }

        let mut entry = PlanEntry {
            source: record.path().to_path_buf(),
            destination,
            category,
            action: ActionKind::Move,
            size: record.size(),
            rationale: None,
            duplicate_of: None,
        };

        if self.settings.dedupe.is_active() {
            self.resolve_duplicate(&mut entry, &record);
        }
        if entry.action == ActionKind::Move {
            self.resolve_collision(&mut entry, record.modified())?;
        }

        self.append(entry, record.modified());
        Ok(())
    }

    pub fn note_symlink(&mut self, path: PathBuf) {
        self.skipped_symlinks.push(path);
    }

    pub fn note_access_error(&mut self, error: AccessError) {
        self.access_errors.push(error);
    }

    /// Freezes the arena into a plan, in discovery order.
    pub fn finish(mut self) -> Plan {
        let mut access_errors = self.access_errors;
        access_errors.extend(self.hasher.take_failures());
        Plan::new(
            self.source_root,
            self.target_root,
            self.layout,
            self.slots.into_iter().map(|slot| slot.entry).collect(),
            self.stats,
            access_errors,
            self.skipped_symlinks,
        )
    }

    fn destination_for(&self, record: &FileRecord, category: &str) -> PathBuf {
        let file_name = record.path().file_name().unwrap_or_default();
        match self.layout {
            Layout::Categorized => {
                let mut dir = self.target_root.join(category);
                if let Some(segment) = self.settings.partition.segment(record) {
                    dir.push(segment);
                }
                dir.join(file_name)
            }
            Layout::Mirrored => match record.path().strip_prefix(&self.source_root) {
                Ok(relative) => self.target_root.join(relative),
                Err(_) => self.target_root.join(file_name),
            },
        }
    }

    /// Applies the dedupe policy. May turn `entry` into a skip, or demote an
    /// earlier entry under `keep-newest`.
    fn resolve_duplicate(&mut self, entry: &mut PlanEntry, record: &FileRecord) {
        let policy = self.settings.dedupe;

        if let Some(index) = self.planned_duplicate(record) {
            let original = self.slots[index].entry.source.clone();
            match policy {
                DedupePolicy::Skip => skip_duplicate(entry, &original),
                DedupePolicy::KeepNewest if record.modified() > self.slots[index].modified => {
                    self.demote_to_duplicate(index, record.path());
                }
                DedupePolicy::KeepNewest => skip_duplicate(entry, &original),
                DedupePolicy::Rename | DedupePolicy::Off => {}
            }
            return;
        }

        if matches!(policy, DedupePolicy::Skip | DedupePolicy::KeepNewest)
            && let Some(existing) = self.existing_duplicate(record, &entry.destination)
        {
            // Files already at the destination are never replaced.
            skip_duplicate(entry, &existing);
        }
    }

    /// First moving entry, in discovery order, with the same content.
    fn planned_duplicate(&mut self, record: &FileRecord) -> Option<usize> {
        let candidates: Vec<usize> = if self.settings.dedupe_require_same_size {
            self.by_size
                .get(&record.size())
                .cloned()
                .unwrap_or_default()
        } else {
            (0..self.slots.len()).collect()
        };

        candidates.into_iter().find(|&index| {
            let slot = &self.slots[index];
            slot.entry.action.is_move()
                && self
                    .hasher
                    .same_content(record.path(), &slot.entry.source)
        })
    }

    /// A file already sitting in the destination directory with the same
    /// content. Files this plan moves away do not count.
    fn existing_duplicate(&mut self, record: &FileRecord, destination: &Path) -> Option<PathBuf> {
        let dir = destination.parent()?;
        let listing = self
            .listings
            .entry(dir.to_path_buf())
            .or_insert_with(|| list_regular_files(dir));

        for (path, size) in listing.iter() {
            if path == record.path() || self.moving_sources.contains(path) {
                continue;
            }
            if self.settings.dedupe_require_same_size && *size != record.size() {
                continue;
            }
            if self.hasher.same_content(record.path(), path) {
                return Some(path.clone());
            }
        }
        None
    }

    /// Applies the collision policy to a moving entry.
    fn resolve_collision(
        &mut self,
        entry: &mut PlanEntry,
        modified: SystemTime,
    ) -> Result<(), PlanError> {
        let wanted = entry.destination.clone();
        let claim = self.claims.get(&wanted).copied();
        if claim.is_none() && !occupied(&wanted) {
            return Ok(());
        }

        match (self.settings.collision, claim) {
            (CollisionPolicy::Rename, _) => {
                self.rename(entry, "destination is taken")?;
            }
            (CollisionPolicy::Skip, Some(index)) => {
                let holder = self.slots[index].entry.source.display().to_string();
                skip_collision(entry, format!("destination already claimed by {holder}"));
            }
            (CollisionPolicy::Skip, None) => {
                skip_collision(entry, "destination already exists".to_string());
            }
            (CollisionPolicy::KeepNewest, Some(index)) => {
                if modified > self.slots[index].modified {
                    self.displace(index, &entry.source)?;
                } else {
                    let holder = self.slots[index].entry.source.display().to_string();
                    skip_collision(
                        entry,
                        format!("destination kept for {holder}, which is newer or was found first"),
                    );
                }
            }
            (CollisionPolicy::KeepNewest, None) => {
                let existing = fs::symlink_metadata(&wanted).and_then(|m| m.modified());
                match existing {
                    Ok(existing) if modified > existing => {
                        self.rename(entry, "existing file is older and is never overwritten")?;
                    }
                    _ => skip_collision(
                        entry,
                        "existing file is newer or the same age".to_string(),
                    ),
                }
            }
        }
        Ok(())
    }

    fn rename(&self, entry: &mut PlanEntry, reason: &str) -> Result<(), PlanError> {
        let free = self.next_free_name(&entry.destination)?;
        let original = entry
            .destination
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        entry.destination = free;
        entry.action = ActionKind::RenameOnCollision;
        entry.rationale = Some(format!("{original}: {reason}"));
        Ok(())
    }

    /// First `stem (N).ext`, counting from 1, that is free on disk and in this
    /// plan.
    ///
    /// A stem that already ends in ` (N)` continues counting from `N + 1`.
    fn next_free_name(&self, wanted: &Path) -> Result<PathBuf, PlanError> {
        let parent = wanted.parent().unwrap_or(Path::new(""));
        let stem = wanted
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let suffix = wanted
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let (base, start) = match NUMBERED_STEM.captures(&stem) {
            Some(caps) => (
                caps["base"].to_string(),
                caps["n"].parse::<u64>().map_or(1, |n| n.saturating_add(1)),
            ),
            None => (stem, 1),
        };

        for n in (start..).take(self.max_rename_attempts as usize) {
            let candidate = parent.join(format!("{base} ({n}){suffix}"));
            if !self.claims.contains_key(&candidate) && !occupied(&candidate) {
                return Ok(candidate);
            }
        }

        Err(PlanError::RenameExhausted {
            path: wanted.to_path_buf(),
            attempts: self.max_rename_attempts,
        })
    }

    /// Rewrites an earlier moving entry as a skipped duplicate of `kept`.
    /// Skips that pointed at the demoted entry now point at `kept`.
    fn demote_to_duplicate(&mut self, index: usize, kept: &Path) {
        let demoted = self.slots[index].entry.source.clone();
        self.demote(index, |entry| {
            entry.action = ActionKind::SkipDuplicate;
            entry.rationale = Some(format!(
                "duplicate of {}, which is newer",
                kept.display()
            ));
            entry.duplicate_of = Some(kept.to_path_buf());
        });
        for slot in &mut self.slots {
            let entry = &mut slot.entry;
            if entry.action == ActionKind::SkipDuplicate
                && entry.duplicate_of.as_deref() == Some(demoted.as_path())
            {
                entry.rationale = Some(format!("duplicate of {}", kept.display()));
                entry.duplicate_of = Some(kept.to_path_buf());
            }
        }
    }

    /// Hands the destination of slot `index` to the newer `winner`.
    ///
    /// The holder is skipped, unless other entries were skipped as its
    /// duplicates: then it moves to a free ` (N)` name instead, so its
    /// content still moves once.
    fn displace(&mut self, index: usize, winner: &Path) -> Result<(), PlanError> {
        let holder = &self.slots[index].entry;
        let cited = self.slots.iter().any(|slot| {
            slot.entry.action == ActionKind::SkipDuplicate
                && slot.entry.duplicate_of.as_deref() == Some(holder.source.as_path())
        });
        if !cited {
            self.demote_to_collision(index, winner);
            return Ok(());
        }

        let mut entry = holder.clone();
        self.claims.remove(&entry.destination);
        self.stats.retract(&entry);
        let reason = format!("destination given to newer file {}", winner.display());
        self.rename(&mut entry, &reason)?;
        self.claims.insert(entry.destination.clone(), index);
        self.stats.record(&entry);
        debug!(
            source = %entry.source.display(),
            destination = %entry.destination.display(),
            "earlier entry renamed"
        );
        self.slots[index].entry = entry;
        Ok(())
    }

    /// Rewrites an earlier moving entry as a collision loser to `winner`.
    fn demote_to_collision(&mut self, index: usize, winner: &Path) {
        self.demote(index, |entry| {
            entry.action = ActionKind::SkipCollision;
            entry.rationale = Some(format!(
                "destination given to newer file {}",
                winner.display()
            ));
        });
    }

    fn demote(&mut self, index: usize, rewrite: impl FnOnce(&mut PlanEntry)) {
        let entry = &mut self.slots[index].entry;
        self.stats.retract(entry);
        if self.claims.get(&entry.destination) == Some(&index) {
            self.claims.remove(&entry.destination);
        }
        self.moving_sources.remove(&entry.source);
        rewrite(entry);
        self.stats.record(entry);
        debug!(
            source = %entry.source.display(),
            action = %entry.action,
            "earlier entry replaced"
        );
    }

    fn append(&mut self, entry: PlanEntry, modified: SystemTime) {
        let index = self.slots.len();
        if entry.action.is_move() {
            self.claims.insert(entry.destination.clone(), index);
            self.by_size.entry(entry.size).or_default().push(index);
            self.moving_sources.insert(entry.source.clone());
        }
        self.stats.record(&entry);
        debug!(
            source = %entry.source.display(),
            destination = %entry.destination.display(),
            action = %entry.action,
            "planned"
        );
        self.slots.push(Slot { entry, modified });
    }
}

fn skip_duplicate(entry: &mut PlanEntry, original: &Path) {
    entry.action = ActionKind::SkipDuplicate;
    entry.rationale = Some(format!("duplicate of {}", original.display()));
    entry.duplicate_of = Some(original.to_path_buf());
}

fn skip_collision(entry: &mut PlanEntry, reason: String) {
    entry.action = ActionKind::SkipCollision;
    entry.rationale = Some(reason);
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Regular files directly inside `dir`, sorted by name. Missing or
/// unreadable directories list as empty.
fn list_regular_files(dir: &Path) -> Vec<(PathBuf, u64)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<(PathBuf, u64)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let metadata = fs::symlink_metadata(entry.path()).ok()?;
            metadata.is_file().then(|| (entry.path(), metadata.len()))
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Overrides};
    use std::fs::File;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    fn set_mtime(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
            .unwrap();
    }

    fn settings(overrides: Overrides) -> Settings {
        Config::default().resolve(&overrides).unwrap()
    }

    fn plan(root: &Path, overrides: Overrides) -> Plan {
        build_plan(&settings(overrides), &PlanRequest::organize(root)).unwrap()
    }

    fn dedupe(policy: &str) -> Overrides {
        Overrides {
            dedupe: Some(policy.to_string()),
            ..Default::default()
        }
    }

    fn collision(policy: &str) -> Overrides {
        Overrides {
            collision: Some(policy.to_string()),
            dedupe: Some("off".to_string()),
            ..Default::default()
        }
    }

    fn action_of(plan: &Plan, source: &Path) -> ActionKind {
        plan.entries()
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.action)
            .unwrap()
    }

    #[test]
    fn test_files_go_to_category_folders() {
        let dir = TempDir::new().unwrap();
        let photo = write(dir.path(), "photo.jpg", "jpg");
        let notes = write(dir.path(), "notes.txt", "txt");
        let blob = write(dir.path(), "blob.xyz", "xyz");

        let plan = plan(dir.path(), Overrides::default());
        let dest = |src: &Path| {
            plan.entries()
                .iter()
                .find(|e| e.source == src)
                .unwrap()
                .destination
                .clone()
        };
        assert_eq!(dest(&photo), dir.path().join("media").join("photo.jpg"));
        assert_eq!(dest(&notes), dir.path().join("docs").join("notes.txt"));
        assert_eq!(dest(&blob), dir.path().join("other").join("blob.xyz"));
        assert_eq!(plan.stats().moves, 3);
        assert_eq!(plan.stats().total_bytes, 9);
    }

    #[test]
    fn test_files_already_in_place_are_omitted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "media/photo.jpg", "jpg");
        let plan = plan(dir.path(), Overrides::default());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_dedupe_skip_references_kept_file() {
        let dir = TempDir::new().unwrap();
        let first = write(dir.path(), "a/photo.jpg", "same bytes");
        let second = write(dir.path(), "b/copy.jpg", "same bytes");

        let plan = plan(dir.path(), dedupe("skip"));
        assert_eq!(plan.stats().moves, 1);
        assert_eq!(plan.stats().skipped_duplicates, 1);
        let skipped = plan
            .entries()
            .iter()
            .find(|e| e.action == ActionKind::SkipDuplicate)
            .unwrap();
        assert_eq!(skipped.source, second);
        assert_eq!(skipped.duplicate_of.as_deref(), Some(first.as_path()));
        assert!(skipped.rationale.as_deref().unwrap().contains("duplicate of"));
    }

    #[test]
    fn test_dedupe_keep_newest_replaces_earlier_entry() {
        let dir = TempDir::new().unwrap();
        let older = write(dir.path(), "a.jpg", "identical");
        let newer = write(dir.path(), "b.jpg", "identical");
        set_mtime(&older, 1_000);
        set_mtime(&newer, 2_000);

        let plan = plan(dir.path(), dedupe("keep-newest"));
        assert_eq!(action_of(&plan, &newer), ActionKind::Move);
        assert_eq!(action_of(&plan, &older), ActionKind::SkipDuplicate);
        let skipped = &plan.entries()[0];
        assert_eq!(skipped.source, older);
        assert_eq!(skipped.duplicate_of.as_deref(), Some(newer.as_path()));
        assert_eq!(plan.stats().moves, 1);
        assert_eq!(plan.stats().skipped_duplicates, 1);
    }

    #[test]
    fn test_dedupe_keep_newest_tie_keeps_first_found() {
        let dir = TempDir::new().unwrap();
        let first = write(dir.path(), "a.jpg", "identical");
        let second = write(dir.path(), "b.jpg", "identical");
        set_mtime(&first, 5_000);
        set_mtime(&second, 5_000);

        let plan = plan(dir.path(), dedupe("keep-newest"));
        assert_eq!(action_of(&plan, &first), ActionKind::Move);
        assert_eq!(action_of(&plan, &second), ActionKind::SkipDuplicate);
    }

    #[test]
    fn test_dedupe_rename_keeps_both_copies() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/photo.jpg", "identical");
        write(dir.path(), "b/photo.jpg", "identical");

        let plan = plan(dir.path(), dedupe("rename"));
        assert_eq!(plan.stats().moves, 1);
        assert_eq!(plan.stats().renames, 1);
    }

    #[test]
    fn test_duplicate_already_at_destination_is_skipped() {
        let dir = TempDir::new().unwrap();
        let existing = write(dir.path(), "media/original.jpg", "photo");
        let incoming = write(dir.path(), "inbox/copy.jpg", "photo");

        let plan = plan(dir.path(), dedupe("skip"));
        assert_eq!(action_of(&plan, &incoming), ActionKind::SkipDuplicate);
        assert_eq!(
            plan.entries()[0].duplicate_of.as_deref(),
            Some(existing.as_path())
        );
    }

    #[test]
    fn test_dedupe_off_treats_copies_as_collisions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/photo.jpg", "identical");
        write(dir.path(), "b/photo.jpg", "identical");

        let plan = plan(dir.path(), dedupe("off"));
        assert_eq!(plan.stats().skipped_duplicates, 0);
        assert_eq!(plan.stats().renames, 1);
    }

    #[test]
    fn test_size_prefilter_avoids_hashing_different_sizes() {
        let dir = TempDir::new().unwrap();
        let small = write(dir.path(), "a.jpg", "x");
        let large = write(dir.path(), "b.jpg", "xx");
        let settings = settings(dedupe("skip"));
        let mut builder = PlanBuilder::new(
            &settings,
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            Layout::Categorized,
        );
        builder.push(FileRecord::from_path(&small).unwrap()).unwrap();
        builder.push(FileRecord::from_path(&large).unwrap()).unwrap();
        assert_eq!(builder.hasher.hashed_count(), 0);
    }

    #[test]
    fn test_collision_rename_follows_discovery_order() {
        let dir = TempDir::new().unwrap();
        let first = write(dir.path(), "a/report.pdf", "one");
        let second = write(dir.path(), "b/report.pdf", "two");
        let third = write(dir.path(), "c/report.pdf", "three");

        let plan = plan(dir.path(), collision("rename"));
        let docs = dir.path().join("docs");
        let dest = |src: &Path| {
            plan.entries()
                .iter()
                .find(|e| e.source == src)
                .unwrap()
                .destination
                .clone()
        };
        assert_eq!(dest(&first), docs.join("report.pdf"));
        assert_eq!(dest(&second), docs.join("report (1).pdf"));
        assert_eq!(dest(&third), docs.join("report (2).pdf"));
        assert_eq!(action_of(&plan, &second), ActionKind::RenameOnCollision);
    }

    #[test]
    fn test_collision_rename_avoids_files_on_disk() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/report.pdf", "existing");
        write(dir.path(), "docs/report (1).pdf", "existing too");
        let incoming = write(dir.path(), "report.pdf", "new");

        let plan = plan(dir.path(), collision("rename"));
        let entry = plan.entries().iter().find(|e| e.source == incoming).unwrap();
        assert_eq!(entry.destination, dir.path().join("docs").join("report (2).pdf"));
    }

    #[test]
    fn test_rename_continues_existing_counter() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "media/photo (3).jpg", "existing");
        let incoming = write(dir.path(), "photo (3).jpg", "new");

        let plan = plan(dir.path(), collision("rename"));
        let entry = plan.entries().iter().find(|e| e.source == incoming).unwrap();
        assert_eq!(entry.destination, dir.path().join("media").join("photo (4).jpg"));
    }

    #[test]
    fn test_rename_exhaustion_is_plan_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "docs/a.txt", "0");
        write(dir.path(), "docs/a (1).txt", "1");
        write(dir.path(), "docs/a (2).txt", "2");
        let incoming = write(dir.path(), "a.txt", "new");

        let settings = settings(collision("rename"));
        let mut builder = PlanBuilder::new(
            &settings,
            dir.path().to_path_buf(),
            dir.path().to_path_buf(),
            Layout::Categorized,
        )
        .with_rename_limit(2);
        let err = builder
            .push(FileRecord::from_path(&incoming).unwrap())
            .unwrap_err();
        assert!(matches!(err, PlanError::RenameExhausted { attempts: 2, .. }));
    }

    #[test]
    fn test_collision_skip_keeps_first_claim() {
        let dir = TempDir::new().unwrap();
        let first = write(dir.path(), "a/x.txt", "one");
        let second = write(dir.path(), "b/x.txt", "two");

        let plan = plan(dir.path(), collision("skip"));
        assert_eq!(action_of(&plan, &first), ActionKind::Move);
        assert_eq!(action_of(&plan, &second), ActionKind::SkipCollision);
    }

    #[test]
    fn test_collision_keep_newest_hands_claim_to_newer_file() {
        let dir = TempDir::new().unwrap();
        let older = write(dir.path(), "a/x.txt", "one");
        let newer = write(dir.path(), "b/x.txt", "two");
        set_mtime(&older, 1_000);
        set_mtime(&newer, 9_000);

        let plan = plan(dir.path(), collision("keep-newest"));
        assert_eq!(action_of(&plan, &older), ActionKind::SkipCollision);
        assert_eq!(action_of(&plan, &newer), ActionKind::Move);
        assert_eq!(plan.moves().count(), 1);
    }

    #[test]
    fn test_collision_keep_newest_tie_keeps_first_found() {
        let dir = TempDir::new().unwrap();
        let first = write(dir.path(), "a/x.txt", "one");
        let second = write(dir.path(), "b/x.txt", "two");
        set_mtime(&first, 3_000);
        set_mtime(&second, 3_000);

        let plan = plan(dir.path(), collision("keep-newest"));
        assert_eq!(action_of(&plan, &first), ActionKind::Move);
        assert_eq!(action_of(&plan, &second), ActionKind::SkipCollision);
    }

    fn dedupe_and_collision(dedupe: &str, collision: &str) -> Overrides {
        Overrides {
            dedupe: Some(dedupe.to_string()),
            collision: Some(collision.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_collision_keep_newest_renames_holder_with_duplicates() {
        let dir = TempDir::new().unwrap();
        let holder = write(dir.path(), "a/x.jpg", "P");
        let copy = write(dir.path(), "b.jpg", "P");
        let newer = write(dir.path(), "c/x.jpg", "Q");
        set_mtime(&holder, 1_000);
        set_mtime(&newer, 5_000);

        let plan = plan(dir.path(), dedupe_and_collision("skip", "keep-newest"));
        let media = dir.path().join("media");
        let holder_entry = plan.entries().iter().find(|e| e.source == holder).unwrap();
        assert_eq!(holder_entry.action, ActionKind::RenameOnCollision);
        assert_eq!(holder_entry.destination, media.join("x (1).jpg"));

        let copy_entry = plan.entries().iter().find(|e| e.source == copy).unwrap();
        assert_eq!(copy_entry.action, ActionKind::SkipDuplicate);
        assert_eq!(copy_entry.duplicate_of.as_deref(), Some(holder.as_path()));

        let newer_entry = plan.entries().iter().find(|e| e.source == newer).unwrap();
        assert_eq!(newer_entry.action, ActionKind::Move);
        assert_eq!(newer_entry.destination, media.join("x.jpg"));

        // Content "P" still moves exactly once, through the file the skip cites.
        let moving_p: Vec<_> = plan
            .moves()
            .filter(|e| fs::read_to_string(&e.source).unwrap() == "P")
            .collect();
        assert_eq!(moving_p.len(), 1);
        assert_eq!(moving_p[0].source, holder);
        assert_eq!(plan.stats().moves, 1);
        assert_eq!(plan.stats().renames, 1);
        assert_eq!(plan.stats().skipped_duplicates, 1);
        assert_eq!(plan.stats().skipped_collisions, 0);
    }

    #[test]
    fn test_collision_keep_newest_skips_holder_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let holder = write(dir.path(), "a/x.jpg", "P");
        write(dir.path(), "b.jpg", "other");
        let newer = write(dir.path(), "c/x.jpg", "Q");
        set_mtime(&holder, 1_000);
        set_mtime(&newer, 5_000);

        let plan = plan(dir.path(), dedupe_and_collision("skip", "keep-newest"));
        assert_eq!(action_of(&plan, &holder), ActionKind::SkipCollision);
        assert_eq!(action_of(&plan, &newer), ActionKind::Move);
    }

    #[test]
    fn test_dedupe_keep_newest_repoints_earlier_skips() {
        let dir = TempDir::new().unwrap();
        let first = write(dir.path(), "a.jpg", "same");
        let oldest = write(dir.path(), "b.jpg", "same");
        let newest = write(dir.path(), "c.jpg", "same");
        set_mtime(&first, 5_000);
        set_mtime(&oldest, 1_000);
        set_mtime(&newest, 9_000);

        let plan = plan(dir.path(), dedupe("keep-newest"));
        assert_eq!(action_of(&plan, &newest), ActionKind::Move);
        for skipped in [&first, &oldest] {
            let entry = plan.entries().iter().find(|e| &e.source == skipped).unwrap();
            assert_eq!(entry.action, ActionKind::SkipDuplicate);
            assert_eq!(entry.duplicate_of.as_deref(), Some(newest.as_path()));
            assert!(entry.rationale.as_deref().unwrap().contains("c.jpg"));
        }
        assert_eq!(plan.moves().count(), 1);
        assert_eq!(plan.stats().skipped_duplicates, 2);
    }

    #[test]
    fn test_collision_keep_newest_against_disk_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let existing = write(dir.path(), "docs/x.txt", "old");
        let incoming = write(dir.path(), "x.txt", "new");
        set_mtime(&existing, 1_000);
        set_mtime(&incoming, 2_000);

        let plan = plan(dir.path(), collision("keep-newest"));
        let entry = plan.entries().iter().find(|e| e.source == incoming).unwrap();
        assert_eq!(entry.action, ActionKind::RenameOnCollision);
        assert_eq!(entry.destination, dir.path().join("docs").join("x (1).txt"));

        set_mtime(&incoming, 500);
        let plan = self::plan(dir.path(), collision("keep-newest"));
        assert_eq!(action_of(&plan, &incoming), ActionKind::SkipCollision);
    }

    #[test]
    fn test_move_destinations_are_unique() {
        let dir = TempDir::new().unwrap();
        for sub in ["a", "b", "c", "d"] {
            write(dir.path(), &format!("{sub}/same.txt"), sub);
            write(dir.path(), &format!("{sub}/same (1).txt"), &format!("{sub}1"));
        }
        let plan = plan(dir.path(), collision("rename"));
        let destinations: HashSet<&Path> =
            plan.moves().map(|e| e.destination.as_path()).collect();
        assert_eq!(destinations.len(), plan.moves().count());
        assert_eq!(plan.moves().count(), 8);
    }

    #[test]
    fn test_category_restriction_omits_other_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "photo.jpg", "jpg");
        write(dir.path(), "notes.txt", "txt");

        let plan = plan(
            dir.path(),
            Overrides {
                categories: Some(vec!["docs".to_string()]),
                ..Default::default()
            },
        );
        assert_eq!(plan.entries().len(), 1);
        assert_eq!(plan.entries()[0].category, "docs");
    }

    #[test]
    fn test_size_filter_boundary_is_inclusive() {
        let dir = TempDir::new().unwrap();
        let exact = write(dir.path(), "exact.txt", &"x".repeat(1_000));
        write(dir.path(), "short.txt", &"x".repeat(999));

        let plan = plan(
            dir.path(),
            Overrides {
                size_min: Some("1KB".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(plan.entries().len(), 1);
        assert_eq!(plan.entries()[0].source, exact);
    }

    #[test]
    fn test_date_partition_adds_subfolders() {
        let dir = TempDir::new().unwrap();
        let photo = write(dir.path(), "photo.jpg", "jpg");
        set_mtime(&photo, 1_710_000_000);

        let plan = plan(
            dir.path(),
            Overrides {
                date_partition: Some("modified".to_string()),
                date_granularity: Some("year".to_string()),
                ..Default::default()
            },
        );
        let record = FileRecord::from_path(&photo).unwrap();
        let year = settings(Overrides {
            date_partition: Some("modified".to_string()),
            date_granularity: Some("year".to_string()),
            ..Default::default()
        })
        .partition
        .segment(&record)
        .unwrap();
        assert_eq!(
            plan.entries()[0].destination,
            dir.path().join("media").join(year).join("photo.jpg")
        );
    }

    #[test]
    fn test_merge_keeps_relative_layout() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        write(src.path(), "photos/a.jpg", "a");
        write(src.path(), "top.txt", "t");

        let plan = build_plan(
            &Settings::default(),
            &PlanRequest::merge(src.path(), dest.path()),
        )
        .unwrap();
        let destinations: Vec<PathBuf> = plan.moves().map(|e| e.destination.clone()).collect();
        assert_eq!(
            destinations,
            vec![
                dest.path().join("photos").join("a.jpg"),
                dest.path().join("top.txt"),
            ]
        );
        assert_eq!(plan.layout(), Layout::Mirrored);
    }

    #[test]
    fn test_merge_into_nested_destination_skips_it() {
        let src = TempDir::new().unwrap();
        write(src.path(), "a.txt", "a");
        write(src.path(), "out/already.txt", "x");

        let plan = build_plan(
            &Settings::default(),
            &PlanRequest::merge(src.path(), src.path().join("out")),
        )
        .unwrap();
        assert_eq!(plan.moves().count(), 1);
        assert_eq!(plan.entries()[0].destination, src.path().join("out").join("a.txt"));
    }

    #[test]
    fn test_ignored_history_file_is_not_planned() {
        let dir = TempDir::new().unwrap();
        let history = write(dir.path(), "history.json", "{}");
        write(dir.path(), "notes.txt", "n");
        let plan = build_plan(
            &Settings::default(),
            &PlanRequest::organize(dir.path()).ignoring(&history),
        )
        .unwrap();
        assert!(plan.entries().iter().all(|e| e.source != history));
        assert_eq!(plan.entries().len(), 1);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let result = build_plan(
            &Settings::default(),
            &PlanRequest::organize(dir.path().join("missing")),
        );
        assert!(matches!(result, Err(PlanError::RootInaccessible(_))));
    }

    #[test]
    fn test_planning_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/x.txt", "1");
        write(dir.path(), "b/x.txt", "2");
        let first = plan(dir.path(), Overrides::default());
        let second = plan(dir.path(), Overrides::default());
        assert_eq!(first, second);
        assert!(!dir.path().join("docs").exists());
    }
}
