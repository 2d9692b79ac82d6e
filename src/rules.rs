//! Extension-based rule matching.
//!
//! A [`Rule`] maps a set of lowercase extensions to a bucket and an optional
//! subpath inside it. Rules are scanned in configuration order and the first
//! rule containing the file's extension wins.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// An extension-to-bucket mapping loaded from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Name recorded in the run log for moves made by this rule.
    pub name: String,
    /// Lowercase extensions without the leading dot.
    pub extensions: BTreeSet<String>,
    /// Bucket key; always present in the bucket map.
    pub bucket: String,
    /// Folder inside the bucket. Empty means the bucket root.
    pub subpath: String,
}

impl Rule {
    pub fn matches_extension(&self, extension: &str) -> bool {
        self.extensions.contains(extension)
    }

    /// `bucket/subpath` as shown to the operator, with the platform separator.
    pub fn label(&self) -> String {
        let mut label = PathBuf::from(&self.bucket);
        if !self.subpath.is_empty() {
            label.push(&self.subpath);
        }
        label.display().to_string()
    }
}

/// Returns the lowercase extension of a file name, without the dot.
///
/// Names without a dot, dot-files such as `.bashrc` and names ending in a dot
/// have no extension.
pub fn extension_of(file_name: impl AsRef<Path>) -> Option<String> {
    file_name
        .as_ref()
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Selects the first rule whose extension set contains the file's extension.
pub fn match_rule<'a>(rules: &'a [Rule], file_name: impl AsRef<Path>) -> Option<&'a Rule> {
    let extension = extension_of(file_name)?;
    rules.iter().find(|rule| rule.matches_extension(&extension))
}
