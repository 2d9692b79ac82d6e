//! PARA configuration: root folder, bucket map, sorting rules and filters.
//!
//! The configuration is a TOML document:
//!
//! ```toml
//! root = "~/PARA"
//!
//! [buckets]
//! projects = "1_Projects"
//! areas = "2_Areas"
//! resources = "3_Resources"
//! archive = "4_Archive"
//!
//! [[rules]]
//! name = "Images"
//! ext = ["png", "jpg"]
//! bucket = "resources"
//! path = "Images"
//!
//! [filters]
//! ignore = ["*.part"]
//! regex = []
//! ```
//!
//! Rules that reference a missing or unknown bucket are dropped with a
//! warning; everything else that is malformed is a [`ConfigError`].

use crate::rules::Rule;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Canonical PARA bucket order used for menus.
pub const PREFERRED_BUCKET_ORDER: [&str; 4] = ["projects", "areas", "resources", "archive"];

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    /// Invalid glob pattern in `[filters]`.
    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),
    /// Invalid regex pattern in `[filters]`.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// IO error while reading or writing configuration.
    #[error("IO error on configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Raw configuration document as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDocument {
    /// PARA root folder. `~` expands to the home directory.
    #[serde(default = "default_root", alias = "para_root")]
    pub root: String,

    /// Bucket key to folder name, in file order.
    #[serde(default)]
    pub buckets: toml::Table,

    /// Ordered rule list; earlier rules win.
    #[serde(default)]
    pub rules: Vec<RuleEntry>,

    #[serde(default, skip_serializing_if = "FilterRules::is_empty")]
    pub filters: FilterRules,
}

fn default_root() -> String {
    "~".to_string()
}

/// A single `[[rules]]` entry before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub ext: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// File name filters for inbox entries that should never be sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Glob patterns matched against the file name (e.g. "*.part").
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

impl FilterRules {
    fn is_empty(&self) -> bool {
        self.ignore.is_empty() && self.regex.is_empty()
    }
}

impl ConfigDocument {
    /// The document `parsort init` writes when no answers are given.
    pub fn default_document(root: &str) -> Self {
        let mut buckets = toml::Table::new();
        for (key, folder) in [
            ("projects", "1_Projects"),
            ("areas", "2_Areas"),
            ("resources", "3_Resources"),
            ("archive", "4_Archive"),
        ] {
            buckets.insert(key.to_string(), toml::Value::String(folder.to_string()));
        }

        let rule = |name: &str, exts: &[&str], bucket: &str, path: &str| RuleEntry {
            name: Some(name.to_string()),
            ext: exts.iter().map(|e| e.to_string()).collect(),
            bucket: Some(bucket.to_string()),
            path: Some(path.to_string()),
        };

        Self {
            root: root.to_string(),
            buckets,
            rules: vec![
                rule("Images", &["png", "jpg", "jpeg", "gif", "webp"], "resources", "Images"),
                rule("Archives", &["zip", "rar", "7z", "tar", "gz"], "archive", "Archives"),
                rule("PDFs", &["pdf"], "resources", "PDFs"),
            ],
            filters: FilterRules::default(),
        }
    }

    /// Renders the document as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }
}

/// Bucket key to folder name, preserving configuration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketMap {
    entries: Vec<(String, String)>,
}

impl BucketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a bucket, keeping its first position.
    pub fn insert(&mut self, key: impl Into<String>, folder: impl Into<String>) {
        let key = key.into();
        let folder = folder.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = folder,
            None => self.entries.push((key, folder)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, folder)| folder.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in menu order: the canonical PARA keys first, then the rest in
    /// insertion order.
    pub fn menu_order(&self) -> Vec<&str> {
        let mut ordered: Vec<&str> = PREFERRED_BUCKET_ORDER
            .iter()
            .copied()
            .filter(|key| self.contains(key))
            .collect();
        ordered.extend(self.keys().filter(|key| !PREFERRED_BUCKET_ORDER.contains(key)));
        ordered
    }
}

/// Compiled name filters.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    ignore_patterns: Vec<Pattern>,
    ignore_regexes: Vec<Regex>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let ignore_patterns = rules
            .ignore
            .iter()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let ignore_regexes = rules
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
            ignore_patterns,
            ignore_regexes,
        })
    }

    /// True if the file name matches any ignore glob or regex.
    pub fn is_ignored(&self, file_name: &str) -> bool {
        self.ignore_patterns.iter().any(|p| p.matches(file_name))
            || self.ignore_regexes.iter().any(|r| r.is_match(file_name))
    }
}

/// Validated configuration, read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct PathConfig {
    /// Absolute PARA root.
    pub root: PathBuf,
    pub buckets: BucketMap,
    pub rules: Vec<Rule>,
    pub filters: CompiledFilters,
    /// Warnings about dropped entries, in document order.
    pub warnings: Vec<String>,
}

impl PathConfig {
    /// Loads configuration for a sort run.
    ///
    /// Order:
    /// 1. `explicit` if given (must exist)
    /// 2. `user_config` if it exists
    /// 3. the built-in default document
    pub fn load(explicit: Option<&Path>, user_config: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        if user_config.exists() {
            return Self::load_from_file(user_config);
        }

        tracing::debug!(path = %user_config.display(), "no user config, using defaults");
        Self::from_document(ConfigDocument::default_document("~"))
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parses a TOML document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let document: ConfigDocument =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        Self::from_document(document)
    }

    /// Validates a document, dropping rules that reference unknown buckets.
    pub fn from_document(document: ConfigDocument) -> Result<Self, ConfigError> {
        let mut warnings = Vec::new();

        let mut buckets = BucketMap::new();
        for (key, value) in &document.buckets {
            match value.as_str() {
                Some(folder) => buckets.insert(key.clone(), folder),
                None => warnings.push(format!("bucket '{}' is not a folder name", key)),
            }
        }

        let mut rules = Vec::new();
        for entry in document.rules {
            let name = entry.name.unwrap_or_else(|| "unnamed".to_string());
            let bucket = entry.bucket.unwrap_or_default().trim().to_string();

            if bucket.is_empty() {
                warnings.push(format!("rule '{}' has no bucket", name));
                continue;
            }
            if !buckets.contains(&bucket) {
                let known: BTreeSet<&str> = buckets.keys().collect();
                warnings.push(format!(
                    "rule '{}' references unknown bucket '{}'. Known: {:?}",
                    name, bucket, known
                ));
                continue;
            }

            let extensions = entry
                .ext
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();

            rules.push(Rule {
                name,
                extensions,
                bucket,
                subpath: entry.path.unwrap_or_default().trim().to_string(),
            });
        }

        for warning in &warnings {
            tracing::warn!("config: {}", warning);
        }

        Ok(Self {
            root: expand_root(&document.root),
            buckets,
            rules,
            filters: CompiledFilters::new(&document.filters)?,
            warnings,
        })
    }

    /// Absolute directory of a bucket. Unknown keys resolve to the root.
    pub fn bucket_dir(&self, bucket: &str) -> PathBuf {
        match self.buckets.get(bucket) {
            Some(folder) if !folder.is_empty() => self.root.join(folder),
            _ => self.root.clone(),
        }
    }

    /// `root / bucket folder / subpath`, with an empty subpath meaning the
    /// bucket directory itself.
    pub fn target_dir(&self, bucket: &str, subpath: &str) -> PathBuf {
        let bucket_dir = self.bucket_dir(bucket);
        if subpath.is_empty() {
            bucket_dir
        } else {
            bucket_dir.join(subpath)
        }
    }
}

/// Expands a leading `~` and makes the path absolute.
pub fn expand_root(raw: &str) -> PathBuf {
    let raw = raw.trim();
    let expanded = match (raw.strip_prefix('~'), dirs::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) => home.join(rest.trim_start_matches(['/', '\\'])),
        _ => PathBuf::from(raw),
    };
    std::path::absolute(&expanded).unwrap_or(expanded)
}
