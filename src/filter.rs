//! Candidate filtering.
//!
//! A [`FileFilter`] is a side-effect-free predicate over discovered files. It
//! combines three independent rules, all of which must pass:
//!
//! - the extension allow-list (empty accepts everything)
//! - inclusive size bounds parsed from human units
//! - the exclusion rules from `[filters]` in the configuration file
//!
//! Sizes use decimal units: `1KB` is 1000 bytes, not 1024.

use crate::config::FilterRules;
use crate::discovery::FileRecord;
use crate::error::ConfigError;
use crate::file_category::normalize_extension;
use glob::Pattern;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use std::path::{Component, Path};

pub const KB: u64 = 1_000;
pub const MB: u64 = 1_000 * KB;
pub const GB: u64 = 1_000 * MB;
pub const TB: u64 = 1_000 * GB;

/// Parses a human readable size such as `"10KB"`, `"1.5 mb"` or `"512"`.
///
/// Units are case-insensitive and decimal. A bare number is bytes.
///
/// # Examples
///
/// ```
/// use dirtidy::filter::parse_size;
///
/// assert_eq!(parse_size("10KB").unwrap(), 10_000);
/// assert_eq!(parse_size("1.5 MB").unwrap(), 1_500_000);
/// assert_eq!(parse_size("42").unwrap(), 42);
/// assert!(parse_size("ten bytes").is_err());
/// ```
pub fn parse_size(input: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidSize {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if compact.is_empty() {
        return Err(invalid("empty size"));
    }

    let split = compact
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(compact.len());
    let (number, unit) = compact.split_at(split);

    let multiplier = match unit {
        "" | "b" => 1,
        "k" | "kb" => KB,
        "m" | "mb" => MB,
        "g" | "gb" => GB,
        "t" | "tb" => TB,
        _ => return Err(invalid("unknown unit (expected B, KB, MB, GB or TB)")),
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("missing number"));
    }
    if fraction.contains('.') || fraction.len() > 12 {
        return Err(invalid("malformed number"));
    }

    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("malformed number"))?
    };
    let mut bytes = whole * u128::from(multiplier);
    if !fraction.is_empty() {
        let scale = 10u128.pow(fraction.len() as u32);
        let digits: u128 = fraction.parse().map_err(|_| invalid("malformed number"))?;
        bytes += (digits * u128::from(multiplier) + scale / 2) / scale;
    }

    u64::try_from(bytes).map_err(|_| invalid("size is too large"))
}

/// Inclusive `[min, max]` byte range. Either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeBounds {
    min: Option<u64>,
    max: Option<u64>,
}

impl SizeBounds {
    /// # Errors
    ///
    /// Returns `InvertedSizeBounds` when `min > max`.
    pub fn new(min: Option<u64>, max: Option<u64>) -> Result<Self, ConfigError> {
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(ConfigError::InvertedSizeBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Parses both ends from human units.
    pub fn parse(min: Option<&str>, max: Option<&str>) -> Result<Self, ConfigError> {
        let min = min.map(parse_size).transpose()?;
        let max = max.map(parse_size).transpose()?;
        Self::new(min, max)
    }

    pub fn contains(&self, size: u64) -> bool {
        self.min.is_none_or(|min| size >= min) && self.max.is_none_or(|max| size <= max)
    }

    pub fn min(&self) -> Option<u64> {
        self.min
    }

    pub fn max(&self) -> Option<u64> {
        self.max
    }
}

/// Compiled exclusion rules.
///
/// Patterns are compiled once so each file costs one pass over the rules.
/// Glob patterns match the path relative to the walked root; regexes match
/// the file name.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl ExclusionRules {
    /// # Errors
    ///
    /// Returns an error if any glob or regex pattern is invalid.
    pub fn compile(rules: &FilterRules) -> Result<Self, ConfigError> {
        let compile_globs = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| {
                    Pattern::new(pattern)
                        .map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
                })
                .collect::<Result<Vec<_>, _>>()
        };

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .filter_map(|ext| normalize_extension(ext))
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Checks a root-relative path against the rules.
    ///
    /// Order, first decisive rule wins:
    /// 1. Include patterns (always keep)
    /// 2. Hidden files and files under hidden directories, unless enabled
    /// 3. Exact file names
    /// 4. Extensions
    /// 5. Glob patterns
    /// 6. Regexes over the file name
    pub fn allows(&self, relative: &Path) -> bool {
        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self.include_patterns.iter().any(|p| p.matches_path(relative)) {
            return true;
        }
        if !self.enable_hidden_files && is_hidden(relative) {
            return false;
        }
        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }
        if let Some(ext) = relative.extension()
            && let Some(ext) = normalize_extension(&ext.to_string_lossy())
            && self.exclude_extensions.contains(&ext)
        {
            return false;
        }
        if self.exclude_patterns.iter().any(|p| p.matches_path(relative)) {
            return false;
        }
        !self.exclude_regexes.iter().any(|r| r.is_match(&file_name))
    }
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// The complete candidate predicate.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    allow: BTreeSet<String>,
    size: SizeBounds,
    exclusions: ExclusionRules,
}

impl FileFilter {
    pub fn new<S: AsRef<str>>(
        allow: impl IntoIterator<Item = S>,
        size: SizeBounds,
        exclusions: ExclusionRules,
    ) -> Self {
        Self {
            allow: allow
                .into_iter()
                .filter_map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
            size,
            exclusions,
        }
    }

    /// Whether `record`, discovered under `root`, is a planning candidate.
    pub fn accepts(&self, record: &FileRecord, root: &Path) -> bool {
        if !self.allow.is_empty() && !self.allow.contains(record.extension()) {
            return false;
        }
        if !self.size.contains(record.size()) {
            return false;
        }
        match record.path().strip_prefix(root) {
            Ok(relative) => self.exclusions.allows(relative),
            Err(_) => record
                .path()
                .file_name()
                .is_some_and(|name| self.exclusions.allows(Path::new(name))),
        }
    }

    pub fn size_bounds(&self) -> SizeBounds {
        self.size
    }

    pub fn allow_list(&self) -> &BTreeSet<String> {
        &self.allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExcludeRules, IncludeRules};
    use std::time::SystemTime;

    fn rules(exclude: ExcludeRules) -> ExclusionRules {
        ExclusionRules::compile(&FilterRules {
            enable_hidden_files: true,
            exclude,
            ..Default::default()
        })
        .unwrap()
    }

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord::new(path, size, None, SystemTime::UNIX_EPOCH)
    }

    #[test]
    fn test_parse_size_units_are_decimal() {
        assert_eq!(parse_size("1KB").unwrap(), 1_000);
        assert_eq!(parse_size("1kb").unwrap(), 1_000);
        assert_eq!(parse_size("2 MB").unwrap(), 2_000_000);
        assert_eq!(parse_size("3GB").unwrap(), 3_000_000_000);
        assert_eq!(parse_size("1TB").unwrap(), 1_000_000_000_000);
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_size_fractions() {
        assert_eq!(parse_size("1.5KB").unwrap(), 1_500);
        assert_eq!(parse_size(".5MB").unwrap(), 500_000);
        assert_eq!(parse_size("0.0005KB").unwrap(), 1);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        for input in ["", "KB", "1.2.3MB", "12PB", "-5", "1e3", "."] {
            assert!(
                matches!(parse_size(input), Err(ConfigError::InvalidSize { .. })),
                "{input:?} should be rejected"
            );
        }
        assert!(parse_size("99999999999TB").is_err());
    }

    #[test]
    fn test_size_bounds_inclusive() {
        let bounds = SizeBounds::parse(Some("10KB"), Some("20KB")).unwrap();
        assert!(bounds.contains(10_000));
        assert!(!bounds.contains(9_999));
        assert!(bounds.contains(20_000));
        assert!(!bounds.contains(20_001));
    }

    #[test]
    fn test_size_bounds_open_ends() {
        let bounds = SizeBounds::new(None, Some(5)).unwrap();
        assert!(bounds.contains(0));
        assert!(!bounds.contains(6));
        assert!(SizeBounds::default().contains(u64::MAX));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = SizeBounds::parse(Some("2MB"), Some("1MB")).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvertedSizeBounds {
                min: 2_000_000,
                max: 1_000_000
            }
        );
    }

    #[test]
    fn test_allow_list_is_case_insensitive() {
        let filter = FileFilter::new(
            ["JPG", ".png"],
            SizeBounds::default(),
            ExclusionRules::default(),
        );
        let root = Path::new("/data");
        assert!(filter.accepts(&record("/data/a.JPG", 1), root));
        assert!(filter.accepts(&record("/data/b.png", 1), root));
        assert!(!filter.accepts(&record("/data/c.gif", 1), root));
        assert!(!filter.accepts(&record("/data/noext", 1), root));
    }

    #[test]
    fn test_empty_allow_list_accepts_everything() {
        let filter = FileFilter::new(
            Vec::<String>::new(),
            SizeBounds::default(),
            ExclusionRules::default(),
        );
        assert!(filter.accepts(&record("/data/noext", 0), Path::new("/data")));
    }

    #[test]
    fn test_hidden_files_excluded_by_default() {
        let rules = ExclusionRules::default();
        assert!(!rules.allows(Path::new(".DS_Store")));
        assert!(!rules.allows(Path::new("sub/.gitignore")));
        assert!(!rules.allows(Path::new(".git/config")));
        assert!(rules.allows(Path::new("visible.txt")));
    }

    #[test]
    fn test_exclude_exact_filename_and_extension() {
        let rules = rules(ExcludeRules {
            filenames: vec!["Thumbs.db".to_string()],
            extensions: vec!["bak".to_string()],
            ..Default::default()
        });
        assert!(!rules.allows(Path::new("Thumbs.db")));
        assert!(!rules.allows(Path::new("notes.BAK")));
        assert!(rules.allows(Path::new("image.jpg")));
    }

    #[test]
    fn test_glob_patterns_respect_directory_boundaries() {
        let rules = rules(ExcludeRules {
            patterns: vec!["**/logs/**".to_string(), "*.cache".to_string()],
            ..Default::default()
        });
        assert!(!rules.allows(Path::new("logs/file.txt")));
        assert!(!rules.allows(Path::new("app/logs/file.txt")));
        assert!(!rules.allows(Path::new("data.cache")));
        assert!(rules.allows(Path::new("my_logs/file.txt")));
    }

    #[test]
    fn test_regex_matches_file_name() {
        let rules = rules(ExcludeRules {
            regex: vec![r"^test_.*\.txt$".to_string()],
            ..Default::default()
        });
        assert!(!rules.allows(Path::new("nested/test_file.txt")));
        assert!(rules.allows(Path::new("file.txt")));
    }

    #[test]
    fn test_include_pattern_overrides_exclusion() {
        let rules = ExclusionRules::compile(&FilterRules {
            include: IncludeRules {
                patterns: vec![".important".to_string()],
            },
            ..Default::default()
        })
        .unwrap();
        assert!(rules.allows(Path::new(".important")));
        assert!(!rules.allows(Path::new(".other")));
    }

    #[test]
    fn test_invalid_patterns_are_config_errors() {
        let bad_glob = ExclusionRules::compile(&FilterRules {
            exclude: ExcludeRules {
                patterns: vec!["[invalid".to_string()],
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(bad_glob, Err(ConfigError::InvalidGlobPattern(_))));

        let bad_regex = ExclusionRules::compile(&FilterRules {
            exclude: ExcludeRules {
                regex: vec!["[invalid(".to_string()],
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(matches!(
            bad_regex,
            Err(ConfigError::InvalidRegexPattern { .. })
        ));
    }

    #[test]
    fn test_exclusions_match_relative_to_root() {
        let filter = FileFilter::new(
            Vec::<String>::new(),
            SizeBounds::default(),
            rules(ExcludeRules {
                patterns: vec!["node_modules/**".to_string()],
                ..Default::default()
            }),
        );
        let root = Path::new("/home/me/downloads");
        assert!(!filter.accepts(
            &record("/home/me/downloads/node_modules/pkg.json", 1),
            root
        ));
        assert!(filter.accepts(&record("/home/me/downloads/pkg.json", 1), root));
    }
}
