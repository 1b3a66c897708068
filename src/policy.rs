//! Planning policies: collision handling, duplicate handling and date
//! partitioning.
//!
//! Every policy parses from the kebab-case name used in configuration files
//! and on the command line. Unknown names are a `ConfigError`.

use crate::discovery::FileRecord;
use crate::error::ConfigError;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// What to do when a destination path is already taken on disk or by an
/// earlier entry of the same plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CollisionPolicy {
    /// Append ` (N)` to the file name until it is free.
    #[default]
    Rename,
    /// Give the destination to the file with the newer modification time.
    KeepNewest,
    /// Leave the earlier claim alone and skip the new file.
    Skip,
}

impl CollisionPolicy {
    pub const NAMES: &'static str = "rename, keep-newest, skip";

    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionPolicy::Rename => "rename",
            CollisionPolicy::KeepNewest => "keep-newest",
            CollisionPolicy::Skip => "skip",
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rename" => Ok(CollisionPolicy::Rename),
            "keep-newest" => Ok(CollisionPolicy::KeepNewest),
            "skip" => Ok(CollisionPolicy::Skip),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "collision",
                value: s.to_string(),
                expected: Self::NAMES,
            }),
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a file whose content matches a file that is already
/// planned or already present at the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DedupePolicy {
    /// No content hashing at all.
    Off,
    /// Keep the first file seen, skip later copies.
    #[default]
    Skip,
    /// Keep the copy with the newest modification time.
    KeepNewest,
    /// Keep every copy; collisions are resolved by the collision policy.
    Rename,
}

impl DedupePolicy {
    pub const NAMES: &'static str = "off, skip, keep-newest, rename";

    pub fn as_str(&self) -> &'static str {
        match self {
            DedupePolicy::Off => "off",
            DedupePolicy::Skip => "skip",
            DedupePolicy::KeepNewest => "keep-newest",
            DedupePolicy::Rename => "rename",
        }
    }

    /// Whether this policy needs content digests.
    pub fn is_active(&self) -> bool {
        !matches!(self, DedupePolicy::Off)
    }
}

impl FromStr for DedupePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(DedupePolicy::Off),
            "skip" => Ok(DedupePolicy::Skip),
            "keep-newest" => Ok(DedupePolicy::KeepNewest),
            "rename" => Ok(DedupePolicy::Rename),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "dedupe",
                value: s.to_string(),
                expected: Self::NAMES,
            }),
        }
    }
}

impl fmt::Display for DedupePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which timestamp drives the date partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DateSource {
    #[default]
    None,
    Created,
    Modified,
}

impl FromStr for DateSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(DateSource::None),
            "created" => Ok(DateSource::Created),
            "modified" => Ok(DateSource::Modified),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "date partition",
                value: s.to_string(),
                expected: "none, created, modified",
            }),
        }
    }
}

/// How deep the date partition goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DateGranularity {
    Year,
    #[default]
    Month,
    Day,
}

impl FromStr for DateGranularity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "year" => Ok(DateGranularity::Year),
            "month" => Ok(DateGranularity::Month),
            "day" => Ok(DateGranularity::Day),
            _ => Err(ConfigError::UnknownPolicy {
                kind: "date granularity",
                value: s.to_string(),
                expected: "year, month, day",
            }),
        }
    }
}

/// Date subfolders under a category, e.g. `media/2024/03`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DatePartition {
    pub source: DateSource,
    pub granularity: DateGranularity,
}

impl DatePartition {
    pub fn new(source: DateSource, granularity: DateGranularity) -> Self {
        Self {
            source,
            granularity,
        }
    }

    /// Returns the relative subfolder for a file, or `None` when
    /// partitioning is disabled.
    ///
    /// Dates are taken in local time. Filesystems without a birth time fall
    /// back to the modification time for `Created`.
    pub fn segment(&self, record: &FileRecord) -> Option<PathBuf> {
        let time = match self.source {
            DateSource::None => return None,
            DateSource::Modified => record.modified(),
            DateSource::Created => match record.created() {
                Some(created) => created,
                None => {
                    debug!(
                        path = %record.path().display(),
                        "creation time unavailable, partitioning by modification time"
                    );
                    record.modified()
                }
            },
        };

        let date: DateTime<Local> = time.into();
        let mut segment = PathBuf::from(date.format("%Y").to_string());
        if matches!(
            self.granularity,
            DateGranularity::Month | DateGranularity::Day
        ) {
            segment.push(date.format("%m").to_string());
        }
        if self.granularity == DateGranularity::Day {
            segment.push(date.format("%d").to_string());
        }
        Some(segment)
    }
}
