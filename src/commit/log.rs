//! Reading and writing the `.doccommit` file.
//!
//! The log lives at the root of a tracked tree; a subdirectory reads and
//! writes its own slice of it, with paths relative to itself. Every write goes
//! to a temporary file in the same directory and is renamed over the log only
//! after the current log is confirmed untouched (its content still hashes to
//! the integrity tag recorded at the last write).

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;

use super::docattr::read_attrs;
use super::entry::CommitEntry;
use super::format::{encode_entry, parse_log};
use super::{Commit, DOCCOMMIT};
use crate::attrs::{dirstore::DIRSTORE_NAME, AttrStore, XATTR_COMMIT};
use crate::error::DocError;
use crate::hash::{commit_file_hash, hash_bytes, Multihash};

/// What to do when the log no longer matches its integrity tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Refuse to overwrite a modified or untagged log.
    #[default]
    Strict,
    /// Accept the current content and re-tag it on the next write.
    Trust,
}

/// Where the log governing a directory lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLocation {
    pub file: PathBuf,
    pub root: PathBuf,
    /// Path of the directory relative to `root`, with a trailing `/`; empty at
    /// the root itself.
    pub prefix: String,
}

impl LogLocation {
    fn at_root(root: PathBuf) -> Self {
        Self {
            file: root.join(DOCCOMMIT),
            root,
            prefix: String::new(),
        }
    }

    fn in_scope(&self, path: &str) -> bool {
        path.starts_with(&self.prefix) && path != self.prefix
    }
}

fn canonical_dir(dir: &Path) -> Result<PathBuf, DocError> {
    let dir = fs::canonicalize(dir).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => DocError::SourceNotFound {
            path: dir.to_path_buf(),
        },
        _ => DocError::io_at(dir, e),
    })?;
    if !dir.is_dir() {
        return Err(DocError::NotADirectory { path: dir });
    }
    Ok(dir)
}

/// Find the nearest log at or above `dir`.
pub fn find_log(dir: &Path) -> Result<Option<LogLocation>, DocError> {
    let dir = canonical_dir(dir)?;
    for root in dir.ancestors() {
        let file = root.join(DOCCOMMIT);
        if file.is_file() {
            let rel = dir.strip_prefix(root)?;
            let prefix = if rel.as_os_str().is_empty() {
                String::new()
            } else {
                let rel = rel.to_str().ok_or_else(|| DocError::NonUtf8Path {
                    path: rel.to_path_buf(),
                })?;
                format!("{}/", rel)
            };
            return Ok(Some(LogLocation {
                file,
                root: root.to_path_buf(),
                prefix,
            }));
        }
    }
    Ok(None)
}

/// The governing log, or a new one rooted at `dir` when none exists.
fn locate(dir: &Path) -> Result<LogLocation, DocError> {
    match find_log(dir)? {
        Some(loc) => Ok(loc),
        None => Ok(LogLocation::at_root(canonical_dir(dir)?)),
    }
}

fn read_all(file: &Path) -> Result<Vec<CommitEntry>, DocError> {
    match File::open(file) {
        Ok(f) => parse_log(BufReader::new(f), file),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(DocError::io_at(file, e)),
    }
}

/// Read the slice of the governing log that covers `dir`, with paths made
/// relative to `dir`. A tree without a log reads as empty.
pub fn read_commit(dir: &Path) -> Result<Commit, DocError> {
    let Some(loc) = find_log(dir)? else {
        return Ok(Commit::new());
    };
    let all = read_all(&loc.file)?;
    let attrs = read_attrs(&loc, &all)?;
    let scoped = all
        .into_iter()
        .filter(|e| loc.in_scope(&e.path))
        .map(|mut e| {
            e.path = e.path[loc.prefix.len()..].to_string();
            e
        });
    let mut commit = Commit::from_entries(scoped);
    commit.set_attrs(attrs);
    Ok(commit)
}

/// Replace everything the log records under `dir` with `entries`.
pub fn write_dir<'e>(
    store: &dyn AttrStore,
    dir: &Path,
    entries: impl IntoIterator<Item = &'e CommitEntry>,
    policy: IntegrityPolicy,
) -> Result<(), DocError> {
    let loc = locate(dir)?;
    let kept = read_all(&loc.file)?
        .into_iter()
        .filter(|e| !loc.in_scope(&e.path));
    let mut all = Commit::from_entries(kept);
    for entry in entries {
        all.upsert(rebase(entry, &loc.prefix));
    }
    PendingWrite::prepare(&loc, &all)?.commit(store, policy)
}

/// Insert or replace `entries` without touching other records under `dir`.
pub fn write_dir_append<'e>(
    store: &dyn AttrStore,
    dir: &Path,
    entries: impl IntoIterator<Item = &'e CommitEntry>,
    policy: IntegrityPolicy,
) -> Result<(), DocError> {
    let loc = locate(dir)?;
    let mut all = Commit::from_entries(read_all(&loc.file)?);
    for entry in entries {
        all.upsert(rebase(entry, &loc.prefix));
    }
    PendingWrite::prepare(&loc, &all)?.commit(store, policy)
}

fn rebase(entry: &CommitEntry, prefix: &str) -> CommitEntry {
    let mut entry = entry.clone();
    entry.path = format!("{}{}", prefix, entry.path);
    entry
}

impl Commit {
    pub fn write(
        &self,
        store: &dyn AttrStore,
        dir: &Path,
        policy: IntegrityPolicy,
    ) -> Result<(), DocError> {
        write_dir(store, dir, self.entries(), policy)
    }
}

/// A fully written temporary log that has not replaced the real one yet.
/// Dropping it removes the temporary file.
pub struct PendingWrite {
    tmp: NamedTempFile,
    target: PathBuf,
    digest: Multihash,
}

impl PendingWrite {
    pub fn prepare(loc: &LogLocation, commit: &Commit) -> Result<Self, DocError> {
        let content: String = commit.entries().map(encode_entry).collect();
        let mut tmp = tempfile::Builder::new()
            .prefix(".doccommit.")
            .tempfile_in(&loc.root)
            .map_err(|e| DocError::io_at(&loc.root, e))?;
        tmp.write_all(content.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| DocError::io_at(tmp.path(), e))?;
        Ok(Self {
            tmp,
            target: loc.file.clone(),
            digest: hash_bytes(content.as_bytes()),
        })
    }

    /// Verify the current log, rename the temporary file over it and tag it.
    pub fn commit(self, store: &dyn AttrStore, policy: IntegrityPolicy) -> Result<(), DocError> {
        verify_integrity(store, &self.target, policy)?;
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| DocError::io_at(&target, e.error))?;
        tracing::debug!(log = %target.display(), hash = %self.digest, "commit log written");
        tag(store, &target, &self.digest)
    }
}

fn tag(store: &dyn AttrStore, file: &Path, digest: &Multihash) -> Result<(), DocError> {
    store.set(file, XATTR_COMMIT, digest.as_bytes())?;
    let meta = fs::symlink_metadata(file).map_err(|e| DocError::io_at(file, e))?;
    commit_file_hash(store, file, &meta, digest, false)?;
    Ok(())
}

/// Check that the log still hashes to its integrity tag. An empty tag marks a
/// log whose append was interrupted and is accepted as is.
pub fn verify_integrity(
    store: &dyn AttrStore,
    file: &Path,
    policy: IntegrityPolicy,
) -> Result<(), DocError> {
    if policy == IntegrityPolicy::Trust {
        return Ok(());
    }
    let content = match fs::read(file) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(DocError::io_at(file, e)),
    };
    match store.get(file, XATTR_COMMIT)? {
        None => Err(DocError::LogUntagged {
            path: file.to_path_buf(),
        }),
        Some(tag) if tag.is_empty() => Ok(()),
        Some(tag) => {
            let actual = hash_bytes(&content);
            if tag == actual.as_bytes() {
                return Ok(());
            }
            let expected = Multihash::from_bytes(tag)
                .map(|h| h.to_base58())
                .unwrap_or_else(|_| "<malformed tag>".to_string());
            Err(DocError::LogModified {
                path: file.to_path_buf(),
                expected,
                actual: actual.to_base58(),
            })
        }
    }
}

/// Create the `.dirstore` and an empty, tagged log at `dir`.
///
/// Returns false when `dir` already had a log.
pub fn init(store: &dyn AttrStore, dir: &Path) -> Result<bool, DocError> {
    let dir = canonical_dir(dir)?;
    let dirstore = dir.join(DIRSTORE_NAME);
    fs::create_dir_all(&dirstore).map_err(|e| DocError::io_at(&dirstore, e))?;
    let loc = LogLocation::at_root(dir);
    if loc.file.exists() {
        return Ok(false);
    }
    tracing::info!(path = %loc.file.display(), "initialized commit log");
    PendingWrite::prepare(&loc, &Commit::new())?.commit(store, IntegrityPolicy::Trust)?;
    Ok(true)
}

/// Streaming appender used while a sync is running.
///
/// The log's integrity tag is cleared on the first append and set to the
/// hash of the final content by [`AppendWriter::finish`].
pub struct AppendWriter<'a> {
    store: &'a dyn AttrStore,
    loc: LogLocation,
    hasher: Sha1,
    out: Option<BufWriter<File>>,
    appended: usize,
}

/// Open the log governing `dir` for appending records relative to `dir`.
pub fn open_dir_append<'a>(
    store: &'a dyn AttrStore,
    dir: &Path,
    policy: IntegrityPolicy,
) -> Result<AppendWriter<'a>, DocError> {
    let loc = locate(dir)?;
    verify_integrity(store, &loc.file, policy)?;
    let mut hasher = Sha1::new();
    match File::open(&loc.file) {
        Ok(mut existing) => {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = existing
                    .read(&mut buf)
                    .map_err(|e| DocError::io_at(&loc.file, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(DocError::io_at(&loc.file, e)),
    }
    Ok(AppendWriter {
        store,
        loc,
        hasher,
        out: None,
        appended: 0,
    })
}

impl AppendWriter<'_> {
    pub fn append(&mut self, entry: &CommitEntry) -> Result<(), DocError> {
        let text = encode_entry(&rebase(entry, &self.loc.prefix));
        if self.out.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.loc.file)
                .map_err(|e| DocError::io_at(&self.loc.file, e))?;
            self.store.set(&self.loc.file, XATTR_COMMIT, b"")?;
            self.out = Some(BufWriter::new(file));
        }
        if let Some(out) = self.out.as_mut() {
            out.write_all(text.as_bytes())
                .map_err(|e| DocError::io_at(&self.loc.file, e))?;
        }
        self.hasher.update(text.as_bytes());
        self.appended += 1;
        Ok(())
    }

    /// Flush and re-tag the log. Returns the number of records appended.
    pub fn finish(self) -> Result<usize, DocError> {
        let Some(out) = self.out else {
            return Ok(0);
        };
        let file = out
            .into_inner()
            .map_err(|e| DocError::io_at(&self.loc.file, e.into_error()))?;
        file.sync_all()
            .map_err(|e| DocError::io_at(&self.loc.file, e))?;
        drop(file);
        let digest = Multihash::from_sha1(&self.hasher.finalize());
        tag(self.store, &self.loc.file, &digest)?;
        Ok(self.appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::DirStore;
    use crate::commit::entry::FileIdentity;

    fn setup() -> (tempfile::TempDir, DirStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(DIRSTORE_NAME));
        (tmp, store)
    }

    fn entries() -> Vec<CommitEntry> {
        vec![
            CommitEntry::dir("sub"),
            CommitEntry::file("sub/a.txt", hash_bytes(b"a")),
            CommitEntry::file("b.txt", hash_bytes(b"b"))
                .with_identity(FileIdentity::DevInode { dev: 3, ino: 9 }),
        ]
    }

    #[test]
    fn write_then_read_round_trip() {
        let (tmp, store) = setup();
        write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Strict).unwrap();

        let commit = read_commit(tmp.path()).unwrap();
        let got: Vec<_> = commit.entries().cloned().collect();
        assert_eq!(got, entries());
        verify_integrity(&store, &tmp.path().join(DOCCOMMIT), IntegrityPolicy::Strict).unwrap();
    }

    #[test]
    fn subdirectory_sees_its_own_slice() {
        let (tmp, store) = setup();
        write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Strict).unwrap();

        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let slice = read_commit(&sub).unwrap();
        let paths: Vec<_> = slice.entries().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec!["a.txt"]);

        // Rewriting the slice leaves the rest of the log alone.
        let replacement = [CommitEntry::file("c.txt", hash_bytes(b"c"))];
        write_dir(&store, &sub, &replacement, IntegrityPolicy::Strict).unwrap();
        let whole = read_commit(tmp.path()).unwrap();
        assert!(whole.by_path("sub/").is_some());
        assert!(whole.by_path("sub/a.txt").is_none());
        assert!(whole.by_path("sub/c.txt").is_some());
        assert!(whole.by_path("b.txt").is_some());
    }

    #[test]
    fn append_upserts_without_dropping_siblings() {
        let (tmp, store) = setup();
        write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Strict).unwrap();

        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let updates = [
            CommitEntry::file("a.txt", hash_bytes(b"a2")),
            CommitEntry::file("new.txt", hash_bytes(b"n")),
        ];
        write_dir_append(&store, &sub, &updates, IntegrityPolicy::Strict).unwrap();

        let whole = read_commit(tmp.path()).unwrap();
        let paths: Vec<_> = whole.entries().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["sub/", "sub/a.txt", "b.txt", "sub/new.txt"]);
        assert_eq!(whole.by_path("sub/a.txt").unwrap().hash, Some(hash_bytes(b"a2")));
        assert!(whole.by_path("b.txt").unwrap().identity.is_some());
        verify_integrity(&store, &tmp.path().join(DOCCOMMIT), IntegrityPolicy::Strict).unwrap();
    }

    #[test]
    fn manual_edit_is_refused_until_trusted() {
        let (tmp, store) = setup();
        write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Strict).unwrap();
        let log = tmp.path().join(DOCCOMMIT);
        let mut text = std::fs::read_to_string(&log).unwrap();
        text.push_str(&format!("{}\tsneaky.txt\n", hash_bytes(b"s")));
        std::fs::write(&log, &text).unwrap();

        let err = write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Strict).unwrap_err();
        assert!(matches!(err, DocError::LogModified { .. }));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), text);

        write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Trust).unwrap();
        verify_integrity(&store, &log, IntegrityPolicy::Strict).unwrap();
    }

    #[test]
    fn aborted_write_leaves_log_untouched() {
        let (tmp, store) = setup();
        write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Strict).unwrap();
        let log = tmp.path().join(DOCCOMMIT);
        let before = std::fs::read(&log).unwrap();

        let loc = find_log(tmp.path()).unwrap().unwrap();
        let pending = PendingWrite::prepare(&loc, &Commit::new()).unwrap();
        let temp_path = pending.tmp.path().to_path_buf();
        assert!(temp_path.exists());
        drop(pending);

        assert!(!temp_path.exists());
        assert_eq!(std::fs::read(&log).unwrap(), before);
    }

    #[test]
    fn append_writer_keeps_the_tag_valid() {
        let (tmp, store) = setup();
        write_dir(&store, tmp.path(), &entries()[..1], IntegrityPolicy::Strict).unwrap();

        let mut writer = open_dir_append(&store, tmp.path(), IntegrityPolicy::Strict).unwrap();
        writer.append(&entries()[1]).unwrap();
        writer.append(&entries()[2]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let log = tmp.path().join(DOCCOMMIT);
        verify_integrity(&store, &log, IntegrityPolicy::Strict).unwrap();
        let got: Vec<_> = read_commit(tmp.path()).unwrap().entries().cloned().collect();
        assert_eq!(got, entries());
    }

    #[test]
    fn append_without_records_does_not_touch_the_log() {
        let (tmp, store) = setup();
        let writer = open_dir_append(&store, tmp.path(), IntegrityPolicy::Strict).unwrap();
        assert_eq!(writer.finish().unwrap(), 0);
        assert!(!tmp.path().join(DOCCOMMIT).exists());
    }

    #[test]
    fn untagged_log_is_refused() {
        let (tmp, store) = setup();
        std::fs::write(tmp.path().join(DOCCOMMIT), "").unwrap();
        let err = write_dir(&store, tmp.path(), &entries(), IntegrityPolicy::Strict).unwrap_err();
        assert!(matches!(err, DocError::LogUntagged { .. }));
    }

    #[test]
    fn init_creates_a_tagged_empty_log_once() {
        let (tmp, store) = setup();
        assert!(init(&store, tmp.path()).unwrap());
        assert!(!init(&store, tmp.path()).unwrap());
        let log = tmp.path().join(DOCCOMMIT);
        assert_eq!(std::fs::read(&log).unwrap(), b"");
        verify_integrity(&store, &log, IntegrityPolicy::Strict).unwrap();
    }
}
