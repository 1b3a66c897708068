//! Configuration loading and validation.
//!
//! Configuration is read from TOML and turned into validated [`Settings`]
//! before any file is examined. Validation is eager: ambiguous category
//! tables, unknown policy names, bad size strings and bad patterns all fail
//! here with a [`ConfigError`].
//!
//! # Configuration File Format
//!
//! ```toml
//! fallback_category = "other"
//!
//! [[categories]]
//! name = "media"
//! extensions = [".jpg", ".png", ".mp4"]
//!
//! [behavior]
//! collision = "rename"          # rename | keep-newest | skip
//! dedupe = "skip"               # off | skip | keep-newest | rename
//! dedupe_require_same_size = true
//! recursive = true
//! date_partition = "none"       # none | created | modified
//! date_granularity = "month"    # year | month | day
//!
//! [filters]
//! enable_hidden_files = false
//! only_extensions = []
//! size_min = "10KB"
//! size_max = "2GB"
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.tmp", "node_modules/**"]
//! extensions = ["bak"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use crate::error::ConfigError;
use crate::file_category::{CategoryMap, DEFAULT_FALLBACK, default_categories};
use crate::filter::{ExclusionRules, FileFilter, SizeBounds};
use crate::policy::{CollisionPolicy, DateGranularity, DatePartition, DateSource, DedupePolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".dirtidyrc.toml";

/// Raw configuration as written in the TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bucket for extensions no category claims.
    pub fallback_category: String,
    /// Ordered category table.
    pub categories: Vec<CategoryConfig>,
    pub behavior: BehaviorConfig,
    pub filters: FilterRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Planning policies, as policy names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    pub collision: String,
    pub dedupe: String,
    /// Only compare digests of files with equal sizes.
    pub dedupe_require_same_size: bool,
    /// Walk subdirectories of the root.
    pub recursive: bool,
    pub date_partition: String,
    pub date_granularity: String,
}

/// Candidate filter rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether to include hidden files (starting with "."). Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    /// Extension allow-list; empty accepts every extension.
    #[serde(default)]
    pub only_extensions: Vec<String>,

    /// Inclusive lower size bound, e.g. `"10KB"`.
    #[serde(default)]
    pub size_min: Option<String>,

    /// Inclusive upper size bound, e.g. `"2GB"`.
    #[serde(default)]
    pub size_max: Option<String>,

    /// Rules for excluding files.
    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for excluding files from organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., ".DS_Store", "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp", "node_modules/**").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude (e.g., "bak", "tmp", "log").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns over the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Rules for including files, overriding exclude rules (whitelist).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Per-invocation values from the command line. `None` keeps the value
/// from the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub only_extensions: Option<Vec<String>>,
    pub size_min: Option<String>,
    pub size_max: Option<String>,
    pub collision: Option<String>,
    pub dedupe: Option<String>,
    pub date_partition: Option<String>,
    pub date_granularity: Option<String>,
    /// Restrict the plan to these categories.
    pub categories: Option<Vec<String>>,
}

/// Validated, immutable settings handed to the planner.
#[derive(Debug, Clone)]
pub struct Settings {
    pub categories: CategoryMap,
    pub filter: FileFilter,
    pub collision: CollisionPolicy,
    pub dedupe: DedupePolicy,
    pub dedupe_require_same_size: bool,
    pub partition: DatePartition,
    pub recursive: bool,
    /// When set, files classified outside these categories are left alone.
    pub only_categories: Option<BTreeSet<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fallback_category: DEFAULT_FALLBACK.to_string(),
            categories: default_categories()
                .into_iter()
                .map(|(name, extensions)| CategoryConfig { name, extensions })
                .collect(),
            behavior: BehaviorConfig::default(),
            filters: FilterRules::default(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            collision: CollisionPolicy::default().to_string(),
            dedupe: DedupePolicy::default().to_string(),
            dedupe_require_same_size: true,
            recursive: true,
            date_partition: "none".to_string(),
            date_granularity: "month".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.dirtidyrc.toml` in the current directory
    /// 3. Look for `~/.config/dirtidy/config.toml` in home directory
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but
    /// cannot be read, or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("dirtidy")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        debug!("no configuration file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if file does not exist.
    /// Returns `ConfigError::Invalid` if TOML parsing fails.
    /// Returns `ConfigError::Io` if file cannot be read.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        debug!(path = %path.display(), "loaded configuration");
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Validates the configuration as written.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        self.resolve(&Overrides::default())
    }

    /// Applies command-line overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from the category table, the policies, the size
    /// bounds or the exclusion patterns. A restriction naming a category that
    /// does not exist is `ConfigError::Invalid`.
    pub fn resolve(&self, overrides: &Overrides) -> Result<Settings, ConfigError> {
        let categories = CategoryMap::new(
            &self.fallback_category,
            self.categories
                .iter()
                .map(|c| (c.name.as_str(), c.extensions.iter())),
        )?;

        let behavior = &self.behavior;
        let pick = |over: &Option<String>, base: &str| -> String {
            over.clone().unwrap_or_else(|| base.to_string())
        };
        let collision = pick(&overrides.collision, &behavior.collision).parse::<CollisionPolicy>()?;
        let dedupe = pick(&overrides.dedupe, &behavior.dedupe).parse::<DedupePolicy>()?;
        let partition = DatePartition::new(
            pick(&overrides.date_partition, &behavior.date_partition).parse::<DateSource>()?,
            pick(&overrides.date_granularity, &behavior.date_granularity)
                .parse::<DateGranularity>()?,
        );

        let filters = &self.filters;
        let size = SizeBounds::parse(
            overrides
                .size_min
                .as_deref()
                .or(filters.size_min.as_deref()),
            overrides
                .size_max
                .as_deref()
                .or(filters.size_max.as_deref()),
        )?;
        let allow = overrides
            .only_extensions
            .as_ref()
            .unwrap_or(&filters.only_extensions);
        let filter = FileFilter::new(allow, size, ExclusionRules::compile(filters)?);

        let only_categories = match &overrides.categories {
            None => None,
            Some(names) => {
                let mut wanted = BTreeSet::new();
                for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
                    if !categories.contains(name) {
                        let available: Vec<&str> = categories.names().collect();
                        return Err(ConfigError::Invalid(format!(
                            "unknown category '{name}' (available: {})",
                            available.join(", ")
                        )));
                    }
                    wanted.insert(name.to_string());
                }
                Some(wanted)
            }
        };

        Ok(Settings {
            categories,
            filter,
            collision,
            dedupe,
            dedupe_require_same_size: behavior.dedupe_require_same_size,
            partition,
            recursive: behavior.recursive,
            only_categories,
        })
    }
}

impl Settings {
    /// Whether files of `category` take part in the plan.
    pub fn wants(&self, category: &str) -> bool {
        self.only_categories
            .as_ref()
            .is_none_or(|wanted| wanted.contains(category))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            categories: CategoryMap::default(),
            filter: FileFilter::default(),
            collision: CollisionPolicy::default(),
            dedupe: DedupePolicy::default(),
            dedupe_require_same_size: true,
            partition: DatePartition::default(),
            recursive: true,
            only_categories: None,
        }
    }
}
