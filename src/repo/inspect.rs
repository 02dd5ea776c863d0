//! Read-only views of a tree: `check`, `status` and `show`.

use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::walk::files;
use crate::attrs::AttrStore;
use crate::error::DocError;
use crate::hash::{cached_hash, format_hash_time, hash_file, hash_time, mtime_of, recorded_hash, Multihash};
use crate::transfer::conflict::{conflict_alternatives, conflict_of};
use crate::transfer::filter::ScanFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    /// Modified since the hash was recorded, with new content.
    Modified,
    /// Modification time moved but the content is unchanged.
    Touched,
    /// Modification time unchanged but the content differs.
    Corrupt,
}

impl CheckStatus {
    pub fn symbol(self) -> char {
        match self {
            CheckStatus::Modified => '+',
            CheckStatus::Touched => '=',
            CheckStatus::Corrupt => '!',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckLine {
    pub status: CheckStatus,
    /// The content hash as of now.
    pub hash: Multihash,
    pub path: PathBuf,
}

impl fmt::Display for CheckLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.status.symbol(), self.hash, self.path.display())
    }
}

/// Re-hash every file with a recorded hash whose modification time is
/// unchanged, or every file with a recorded hash at all when `all` is set.
pub fn check_tree(
    store: &dyn AttrStore,
    dir: &Path,
    all: bool,
) -> (Vec<CheckLine>, Vec<DocError>) {
    let filter = ScanFilter::new(&[], false).unwrap_or_else(|_| ScanFilter::standard());
    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for entry in files(dir, &filter) {
        let result = entry.and_then(|entry| {
            let meta = entry.metadata()?;
            check_file(store, entry.path(), &meta, all)
        });
        match result {
            Ok(Some(line)) => lines.push(line),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }
    (lines, errors)
}

fn check_file(
    store: &dyn AttrStore,
    path: &Path,
    meta: &std::fs::Metadata,
    all: bool,
) -> Result<Option<CheckLine>, DocError> {
    let Some(recorded_time) = hash_time(store, path)? else {
        return Ok(None);
    };
    let time_equal = recorded_time == mtime_of(path, meta)?;
    if !all && !time_equal {
        return Ok(None);
    }
    let recorded = recorded_hash(store, path)?;
    let actual = hash_file(path)?;
    let hash_equal = recorded.as_ref() == Some(&actual);

    let status = match (time_equal, hash_equal) {
        (false, false) => CheckStatus::Modified,
        (true, false) => CheckStatus::Corrupt,
        (false, true) => CheckStatus::Touched,
        (true, true) => return Ok(None),
    };
    Ok(Some(CheckLine {
        status,
        hash: actual,
        path: path.to_path_buf(),
    }))
}

/// Which side of a conflict a file is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictRole {
    /// Has alternatives stored beside it.
    Main,
    /// Is itself a conflict copy.
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// `?` untracked, `+` modified, none for clean files listed only for
    /// their conflict.
    pub change: Option<char>,
    pub conflict: Option<ConflictRole>,
    /// Untracked and read-only: recording its hash will need `--force`.
    pub read_only: bool,
    pub path: PathBuf,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut marks = Vec::new();
        if let Some(change) = self.change {
            marks.push(change.to_string());
        }
        match self.conflict {
            Some(ConflictRole::Main) => marks.push("C".to_string()),
            Some(ConflictRole::Alternate) => marks.push("c".to_string()),
            None => {}
        }
        if self.read_only {
            marks.push("(ro)".to_string());
        }
        write!(f, "{}\t{}", marks.join(" "), self.path.display())
    }
}

fn conflict_role(store: &dyn AttrStore, path: &Path) -> Result<Option<ConflictRole>, DocError> {
    if conflict_of(store, path)?.is_some() {
        return Ok(Some(ConflictRole::Alternate));
    }
    if !conflict_alternatives(store, path)?.is_empty() {
        return Ok(Some(ConflictRole::Main));
    }
    Ok(None)
}

/// Files that are untracked, modified since their hash was recorded, or part
/// of a conflict.
pub fn status_tree(
    store: &dyn AttrStore,
    dir: &Path,
    docignore: bool,
) -> Result<(Vec<StatusLine>, Vec<DocError>), DocError> {
    let filter = ScanFilter::new(&[], docignore)?;
    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for entry in files(dir, &filter) {
        let result = entry.and_then(|entry| {
            let meta = entry.metadata()?;
            let path = entry.path();
            let conflict = conflict_role(store, path)?;
            let change = match hash_time(store, path)? {
                None => Some('?'),
                Some(time) if time != mtime_of(path, &meta)? => Some('+'),
                Some(_) => None,
            };
            if change.is_none() && conflict.is_none() {
                return Ok(None);
            }
            Ok(Some(StatusLine {
                change,
                conflict,
                read_only: change == Some('?') && meta.permissions().mode() & 0o200 == 0,
                path: path.to_path_buf(),
            }))
        });
        match result {
            Ok(Some(line)) => lines.push(line),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }
    Ok((lines, errors))
}

/// Files whose cached hash is still valid, with that hash.
pub fn committed_hashes(
    store: &dyn AttrStore,
    dir: &Path,
    docignore: bool,
) -> Result<(Vec<(Multihash, PathBuf)>, Vec<DocError>), DocError> {
    let filter = ScanFilter::new(&[], docignore)?;
    let mut hashes = Vec::new();
    let mut errors = Vec::new();
    for entry in files(dir, &filter) {
        let result = entry.and_then(|entry| {
            let meta = entry.metadata()?;
            cached_hash(store, entry.path(), &meta)
                .map(|hash| hash.map(|h| (h, entry.path().to_path_buf())))
        });
        match result {
            Ok(Some(item)) => hashes.push(item),
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }
    Ok((hashes, errors))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    New,
    Dirty,
    Clean,
    Corrupted,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileState::New => "New",
            FileState::Dirty => "Dirty",
            FileState::Clean => "Clean",
            FileState::Corrupted => "Corrupted",
        })
    }
}

/// Everything known about one file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub conflict_with: Option<String>,
    pub alternatives: Vec<String>,
    pub hash_time: Option<DateTime<Utc>>,
    pub recorded: Option<Multihash>,
    /// Present when a content check was requested.
    pub actual: Option<Multihash>,
    pub state: FileState,
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File: {}", self.path.display())?;
        if let Some(original) = &self.conflict_with {
            writeln!(f, "Conflict With: {}", original)?;
        }
        for alt in &self.alternatives {
            writeln!(f, "Conflict Alternative: {}", alt)?;
        }
        if let Some(time) = &self.hash_time {
            writeln!(f, "Hash Time: {}", format_hash_time(time))?;
        }
        if let Some(hash) = &self.recorded {
            writeln!(f, "Recorded Hash: {}", hash)?;
        }
        if let Some(hash) = &self.actual {
            writeln!(f, "Actual Hash:   {}", hash)?;
        }
        write!(f, "Status: {}", self.state)
    }
}

pub fn show_file(store: &dyn AttrStore, path: &Path, check: bool) -> Result<FileReport, DocError> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| DocError::io_at(path, e))?;
    let actual = if check { Some(hash_file(path)?) } else { None };
    let hash_time = hash_time(store, path)?;
    let recorded = recorded_hash(store, path)?;

    let state = match hash_time {
        None => FileState::New,
        Some(time) if time != mtime_of(path, &meta)? => FileState::Dirty,
        Some(_) => match &actual {
            Some(actual) if recorded.as_ref() != Some(actual) => FileState::Corrupted,
            _ => FileState::Clean,
        },
    };
    Ok(FileReport {
        path: path.to_path_buf(),
        conflict_with: conflict_of(store, path)?,
        alternatives: conflict_alternatives(store, path)?,
        hash_time,
        recorded: hash_time.and(recorded),
        actual,
        state,
    })
}

/// Reports for every regular file at or under each of `paths`.
pub fn show_paths(
    store: &dyn AttrStore,
    paths: &[PathBuf],
    check: bool,
) -> (Vec<FileReport>, Vec<DocError>) {
    let filter = ScanFilter::new(&[], false).unwrap_or_else(|_| ScanFilter::standard());
    let mut reports = Vec::new();
    let mut errors = Vec::new();
    for root in paths {
        for entry in files(root, &filter) {
            match entry.and_then(|entry| show_file(store, entry.path(), check)) {
                Ok(report) => reports.push(report),
                Err(e) => errors.push(e),
            }
        }
    }
    (reports, errors)
}
