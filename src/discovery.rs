//! Directory traversal.
//!
//! [`Discovery`] walks a root lazily and yields one [`Discovered`] item per
//! regular file, symbolic link or unreadable entry. Entries are sorted by
//! file name within each directory so that two walks over an unchanged tree
//! produce the same sequence. Symbolic links are never followed.

use crate::error::AccessError;
use crate::file_category::normalize_extension;
use crate::history::HISTORY_TEMP_PREFIX;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// One discovered regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    path: PathBuf,
    size: u64,
    created: Option<SystemTime>,
    modified: SystemTime,
    extension: String,
}

impl FileRecord {
    /// Builds a record from known values. The extension is derived from the
    /// path.
    pub fn new(
        path: impl Into<PathBuf>,
        size: u64,
        created: Option<SystemTime>,
        modified: SystemTime,
    ) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|ext| normalize_extension(&ext.to_string_lossy()))
            .unwrap_or_default();
        Self {
            path,
            size,
            created,
            modified,
            extension,
        }
    }

    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Self::new(path, metadata.len(), metadata.created().ok(), modified)
    }

    /// Stats `path` without following symbolic links.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, AccessError> {
        let path = path.into();
        let metadata = fs::symlink_metadata(&path).map_err(|e| AccessError::new(&path, e))?;
        if !metadata.is_file() {
            return Err(AccessError::new(&path, "not a regular file"));
        }
        Ok(Self::from_metadata(path, &metadata))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Birth time, when the filesystem reports one.
    pub fn created(&self) -> Option<SystemTime> {
        self.created
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Lowercase extension with its leading dot, or `""`.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// What a walk step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovered {
    File(FileRecord),
    /// A symbolic link, skipped without being followed.
    Symlink(PathBuf),
    Inaccessible(AccessError),
}

/// Options for one walk.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Files that are never yielded, such as the history log.
    pub ignore_files: Vec<PathBuf>,
    /// Directories that are not entered, such as a merge destination nested
    /// inside the source.
    pub skip_dirs: Vec<PathBuf>,
}

/// Lazy walk over a root directory.
pub struct Discovery {
    root: PathBuf,
    walker: Box<dyn Iterator<Item = walkdir::Result<DirEntry>>>,
    ignore_files: Vec<PathBuf>,
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Discovery {
    /// Opens `root` for walking.
    ///
    /// # Errors
    ///
    /// Returns an `AccessError` when the root is missing, is not a directory
    /// or cannot be listed. Errors below the root are yielded per entry.
    pub fn new(root: &Path, options: DiscoveryOptions) -> Result<Self, AccessError> {
        let root = std::path::absolute(root).map_err(|e| AccessError::new(root, e))?;
        let metadata = fs::metadata(&root).map_err(|e| AccessError::new(&root, e))?;
        if !metadata.is_dir() {
            return Err(AccessError::new(&root, "not a directory"));
        }
        fs::read_dir(&root).map_err(|e| AccessError::new(&root, e))?;

        let mut walk = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1);
        if !options.recursive {
            walk = walk.max_depth(1);
        }

        let skip_dirs = options.skip_dirs;
        let walker = walk.into_iter().filter_entry(move |entry| {
            !(entry.file_type().is_dir() && skip_dirs.iter().any(|dir| dir == entry.path()))
        });

        Ok(Self {
            root,
            walker: Box::new(walker),
            ignore_files: options.ignore_files,
        })
    }

    /// The absolute root being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Iterator for Discovery {
    type Item = Discovered;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    return Some(Discovered::Inaccessible(AccessError::new(path, err)));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "skipping symbolic link");
                return Some(Discovered::Symlink(entry.into_path()));
            }
            if !file_type.is_file() {
                debug!(path = %entry.path().display(), "skipping special file");
                continue;
            }
            if self.ignore_files.iter().any(|p| p == entry.path()) {
                continue;
            }
            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(HISTORY_TEMP_PREFIX)
            {
                debug!(path = %entry.path().display(), "skipping history temp file");
                continue;
            }

            return Some(match entry.metadata() {
                Ok(metadata) => Discovered::File(FileRecord::from_metadata(
                    entry.into_path(),
                    &metadata,
                )),
                Err(err) => {
                    warn!(path = %entry.path().display(), error = %err, "cannot stat file");
                    Discovered::Inaccessible(AccessError::new(entry.path(), err))
                }
            });
        }
    }
}
