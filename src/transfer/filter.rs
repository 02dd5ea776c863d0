use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::DirEntry;

use crate::attrs::dirstore::DIRSTORE_NAME;
use crate::commit::DOCCOMMIT;
use crate::error::DocError;

/// Marker file: a directory holding an empty `.docignore` is not tracked.
pub const DOCIGNORE: &str = ".docignore";

/// Decides which entries a tree walk visits.
///
/// Bookkeeping entries (`.dirstore`, `.doccommit` and temporary log files) are
/// always skipped. Exclude globs match either the full path or the file name.
pub struct ScanFilter {
    excludes: Option<GlobSet>,
    docignore: bool,
}

impl ScanFilter {
    /// Returns `DocError::InvalidPattern` if any glob pattern is malformed.
    pub fn new(exclude_patterns: &[String], docignore: bool) -> Result<Self, DocError> {
        let excludes = if exclude_patterns.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in exclude_patterns {
                builder.add(Glob::new(pattern)?);
            }
            Some(builder.build()?)
        };
        Ok(Self {
            excludes,
            docignore,
        })
    }

    /// No globs, `.docignore` honored.
    pub fn standard() -> Self {
        Self {
            excludes: None,
            docignore: true,
        }
    }

    pub fn is_reserved(name: &str) -> bool {
        name == DIRSTORE_NAME || name == DOCCOMMIT || name.starts_with(".doccommit.")
    }

    /// True when `path` (named `name` inside its parent) should be skipped.
    pub fn skips(&self, path: &Path, is_dir: bool) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if Self::is_reserved(name) {
            return true;
        }
        if let Some(ref excludes) = self.excludes {
            if excludes.is_match(path) || excludes.is_match(Path::new(name)) {
                return true;
            }
        }
        is_dir && self.docignore && is_ignored_dir(path)
    }

    /// For `walkdir::IntoIter::filter_entry`: keep entries that are not skipped.
    pub fn keeps(&self, entry: &DirEntry) -> bool {
        entry.depth() == 0 || !self.skips(entry.path(), entry.file_type().is_dir())
    }
}

/// A directory is ignored when it contains an empty `.docignore` file.
pub fn is_ignored_dir(dir: &Path) -> bool {
    std::fs::metadata(dir.join(DOCIGNORE))
        .map(|m| m.is_file() && m.len() == 0)
        .unwrap_or(false)
}
