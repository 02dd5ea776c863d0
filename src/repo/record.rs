//! `commit`: refresh cached hashes and rewrite the commit log.

use std::fs;
use std::path::{Path, PathBuf};

use super::walk::walk;
use crate::attrs::AttrStore;
use crate::commit::{
    read_commit, write_dir_append, Commit, CommitEntry, FileIdentity, IntegrityPolicy,
};
use crate::error::DocError;
use crate::hash::{cached_hash, commit_file_hash, hash_file, Multihash};
use crate::transfer::filter::ScanFilter;

#[derive(Debug, Clone, Copy)]
pub struct CommitOptions {
    /// Lift read-only modes to write attributes, and overwrite a log that
    /// fails its integrity check.
    pub force: bool,
    pub write_log: bool,
    pub docignore: bool,
    pub policy: IntegrityPolicy,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            force: false,
            write_log: true,
            docignore: true,
            policy: IntegrityPolicy::Strict,
        }
    }
}

#[derive(Debug, Default)]
pub struct CommitSummary {
    /// Files whose hash had to be computed, with the new hash.
    pub updated: Vec<(Multihash, PathBuf)>,
    /// Read-only files made writable for the attribute update.
    pub forced: Vec<PathBuf>,
    /// Files that could not be hashed or tagged. A directory commit leaves
    /// them out of the log; a single-file commit keeps the previous record.
    pub failures: Vec<DocError>,
    /// Entries written by this commit.
    pub entries: usize,
}

/// Commit `path`: a whole directory, or a single file inside its parent's
/// slice of the log.
pub fn commit_tree(
    store: &dyn AttrStore,
    path: &Path,
    opts: &CommitOptions,
) -> Result<CommitSummary, DocError> {
    let meta = fs::symlink_metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DocError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => DocError::io_at(path, e),
    })?;

    // A directory rewrites its whole slice of the log; a single file only
    // upserts its own record.
    let (dir, mut commit) = if meta.is_dir() {
        let mut commit = read_commit(path)?;
        commit.drop_tree("");
        (path.to_path_buf(), commit)
    } else {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        (dir, Commit::new())
    };

    let filter = ScanFilter::new(&[], opts.docignore)?;
    let mut summary = CommitSummary::default();
    for entry in walk(path, &filter) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                summary.failures.push(e);
                continue;
            }
        };
        let file_type = entry.file_type();
        if entry.depth() == 0 && file_type.is_dir() {
            continue;
        }
        if !file_type.is_dir() && !file_type.is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(&dir)?;
        let Some(rel) = rel.to_str() else {
            summary.failures.push(DocError::NonUtf8Path {
                path: entry.path().to_path_buf(),
            });
            continue;
        };
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                summary.failures.push(e.into());
                continue;
            }
        };
        let identity = FileIdentity::from_metadata(&meta);

        if file_type.is_dir() {
            commit.upsert(CommitEntry::dir(rel).with_identity(identity));
            continue;
        }

        let hash = match refresh_hash(store, entry.path(), &meta, opts.force, &mut summary) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::debug!(path = %entry.path().display(), error = %e, "not committed");
                summary.failures.push(e);
                continue;
            }
        };
        commit.upsert(CommitEntry::file(rel, hash).with_identity(identity));
    }

    summary.entries = commit.len();
    if opts.write_log {
        let policy = if opts.force {
            IntegrityPolicy::Trust
        } else {
            opts.policy
        };
        if meta.is_dir() {
            commit.write(store, &dir, policy)?;
        } else if !commit.is_empty() {
            write_dir_append(store, &dir, commit.entries(), policy)?;
        }
    }
    Ok(summary)
}

fn refresh_hash(
    store: &dyn AttrStore,
    path: &Path,
    meta: &fs::Metadata,
    force: bool,
    summary: &mut CommitSummary,
) -> Result<Multihash, DocError> {
    if let Some(hash) = cached_hash(store, path, meta)? {
        return Ok(hash);
    }
    let hash = hash_file(path)?;
    if commit_file_hash(store, path, meta, &hash, force)? {
        summary.forced.push(path.to_path_buf());
    }
    summary.updated.push((hash.clone(), path.to_path_buf()));
    Ok(hash)
}
