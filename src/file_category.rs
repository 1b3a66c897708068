//! Extension based categorization.
//!
//! A [`CategoryMap`] is built once from the configured category table and is
//! read-only afterwards. Building it validates the table: an extension may
//! belong to at most one category, and no category may reuse the fallback
//! name that unmatched extensions resolve to.
//!
//! # Examples
//!
//! ```
//! use dirtidy::file_category::CategoryMap;
//!
//! let map = CategoryMap::default();
//! assert_eq!(map.classify(".JPG"), "media");
//! assert_eq!(map.classify(".pdf"), "docs");
//! assert_eq!(map.classify(".xyz"), "other");
//! assert_eq!(map.classify(""), "other");
//! ```
use crate::error::ConfigError;
use std::collections::{BTreeSet, HashMap};

/// Name of the bucket for extensions no category claims.
pub const DEFAULT_FALLBACK: &str = "other";

/// Built-in category table, used when no configuration file is found.
const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "media",
        &[
            "jpg", "jpeg", "png", "gif", "webp", "svg", "heic", "mp4", "mkv", "avi", "mov", "mp3",
            "wav", "flac", "m4a",
        ],
    ),
    (
        "docs",
        &[
            "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "md", "rtf", "csv",
        ],
    ),
    (
        "code",
        &[
            "py", "js", "ts", "html", "css", "json", "yml", "yaml", "sql", "sh", "bat", "ps1",
        ],
    ),
    ("archives", &["zip", "rar", "7z", "tar", "gz", "bz2"]),
    ("executables", &["exe", "msi", "dmg", "app", "bin"]),
];

/// Normalizes an extension to lowercase with a single leading dot.
///
/// Returns `None` for blank input.
///
/// # Examples
///
/// ```
/// use dirtidy::file_category::normalize_extension;
///
/// assert_eq!(normalize_extension("JPG"), Some(".jpg".to_string()));
/// assert_eq!(normalize_extension(" .Tar "), Some(".tar".to_string()));
/// assert_eq!(normalize_extension("  "), None);
/// ```
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(format!(".{}", trimmed.to_lowercase()))
}

/// One named category and the extensions it claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    name: String,
    extensions: BTreeSet<String>,
}

impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized extensions, sorted.
    pub fn extensions(&self) -> &BTreeSet<String> {
        &self.extensions
    }
}

/// Validated extension → category mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMap {
    categories: Vec<Category>,
    by_extension: HashMap<String, usize>,
    fallback: String,
}

impl CategoryMap {
    /// Builds the mapping from `(name, extensions)` pairs, in order.
    ///
    /// # Errors
    ///
    /// - `InvalidCategoryName` for empty names or names that are not a single
    ///   path component
    /// - `ReservedCategory` when a category is named like the fallback
    /// - `DuplicateExtension` when two categories claim one extension
    pub fn new<N, E, S>(
        fallback: &str,
        categories: impl IntoIterator<Item = (N, E)>,
    ) -> Result<Self, ConfigError>
    where
        N: AsRef<str>,
        E: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fallback = validate_name(fallback)?;
        let mut map = Self {
            categories: Vec::new(),
            by_extension: HashMap::new(),
            fallback,
        };

        for (name, extensions) in categories {
            let name = validate_name(name.as_ref())?;
            if name == map.fallback {
                return Err(ConfigError::ReservedCategory(name));
            }
            if map.categories.iter().any(|c| c.name == name) {
                return Err(ConfigError::Invalid(format!(
                    "category '{name}' is defined more than once"
                )));
            }

            let index = map.categories.len();
            let mut claimed = BTreeSet::new();
            for raw in extensions {
                let Some(ext) = normalize_extension(raw.as_ref()) else {
                    continue;
                };
                if let Some(&owner) = map.by_extension.get(&ext)
                    && owner != index
                {
                    return Err(ConfigError::DuplicateExtension {
                        extension: ext,
                        first: map.categories[owner].name.clone(),
                        second: name,
                    });
                }
                map.by_extension.insert(ext.clone(), index);
                claimed.insert(ext);
            }

            map.categories.push(Category {
                name,
                extensions: claimed,
            });
        }

        Ok(map)
    }

    /// Returns the category for a normalized or raw extension.
    ///
    /// Lookup is case-insensitive; unmatched and empty extensions resolve to
    /// the fallback category.
    pub fn classify(&self, extension: &str) -> &str {
        normalize_extension(extension)
            .and_then(|ext| self.by_extension.get(&ext))
            .map(|&index| self.categories[index].name.as_str())
            .unwrap_or(self.fallback.as_str())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Configured categories in declaration order, fallback excluded.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Whether `name` is a configured category or the fallback.
    pub fn contains(&self, name: &str) -> bool {
        name == self.fallback || self.categories.iter().any(|c| c.name == name)
    }

    /// All category names including the fallback, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .map(|c| c.name.as_str())
            .chain(std::iter::once(self.fallback.as_str()))
    }
}

impl Default for CategoryMap {
    fn default() -> Self {
        let mut categories = Vec::with_capacity(DEFAULT_CATEGORIES.len());
        let mut by_extension = HashMap::new();
        for (index, (name, extensions)) in DEFAULT_CATEGORIES.iter().enumerate() {
            let extensions: BTreeSet<String> =
                extensions.iter().map(|ext| format!(".{ext}")).collect();
            for ext in &extensions {
                by_extension.insert(ext.clone(), index);
            }
            categories.push(Category {
                name: name.to_string(),
                extensions,
            });
        }
        Self {
            categories,
            by_extension,
            fallback: DEFAULT_FALLBACK.to_string(),
        }
    }
}

/// Convenience form of [`CategoryMap::classify`].
pub fn classify<'a>(extension: &str, mapping: &'a CategoryMap) -> &'a str {
    mapping.classify(extension)
}

/// The built-in table as `(name, extensions)` pairs.
pub fn default_categories() -> Vec<(String, Vec<String>)> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(name, extensions)| {
            (
                name.to_string(),
                extensions.iter().map(|ext| format!(".{ext}")).collect(),
            )
        })
        .collect()
}

fn validate_name(raw: &str) -> Result<String, ConfigError> {
    let name = raw.trim();
    let path_like = name.contains(['/', '\\']) || name == "." || name == "..";
    if name.is_empty() || path_like {
        return Err(ConfigError::InvalidCategoryName(raw.to_string()));
    }
    Ok(name.to_string())
}
