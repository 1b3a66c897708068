//! Content digests for duplicate detection.

use crate::error::AccessError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const BUFFER_SIZE: usize = 8192;

/// Compute the hex SHA-256 of a file's contents by streaming it through a
/// fixed-size buffer.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Per-pass digest cache.
///
/// Each path is hashed at most once, failures included. A file that cannot
/// be read is reported once through [`ContentHasher::take_failures`] and is
/// never considered a duplicate of anything.
#[derive(Debug, Default)]
pub struct ContentHasher {
    cache: HashMap<PathBuf, Option<String>>,
    failures: Vec<AccessError>,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest of `path`, or `None` when it cannot be read.
    pub fn digest(&mut self, path: &Path) -> Option<&str> {
        if !self.cache.contains_key(path) {
            let digest = match hash_file(path) {
                Ok(digest) => {
                    debug!(path = %path.display(), %digest, "hashed");
                    Some(digest)
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "cannot hash file");
                    self.failures.push(AccessError::new(path, err));
                    None
                }
            };
            self.cache.insert(path.to_path_buf(), digest);
        }
        self.cache.get(path).and_then(|d| d.as_deref())
    }

    /// Whether two files have equal digests. Unreadable files match nothing.
    pub fn same_content(&mut self, a: &Path, b: &Path) -> bool {
        let Some(first) = self.digest(a).map(str::to_owned) else {
            return false;
        };
        self.digest(b) == Some(first.as_str())
    }

    /// Number of files actually read.
    pub fn hashed_count(&self) -> usize {
        self.cache.len()
    }

    /// Read failures collected so far.
    pub fn take_failures(&mut self) -> Vec<AccessError> {
        std::mem::take(&mut self.failures)
    }
}
