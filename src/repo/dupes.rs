//! `dupes`: files sharing a content hash, grouped by inode.
//!
//! Only hashes still valid for the file's modification time are trusted;
//! files that changed since they were hashed are left out. Nothing is
//! re-read, so run `check` first before deduplicating content that matters.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::walk::files;
use crate::attrs::AttrStore;
use crate::commit::{Commit, CommitEntry, FileIdentity};
use crate::error::DocError;
use crate::hash::{cached_hash, Multihash};
use crate::progress::Progress;
use crate::transfer::filter::ScanFilter;

/// Paths of one inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSet {
    pub identity: FileIdentity,
    pub paths: Vec<PathBuf>,
}

/// Files with the same content, one `LinkSet` per inode in walk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DupeGroup {
    pub hash: Multihash,
    pub links: Vec<LinkSet>,
}

impl DupeGroup {
    /// More than one inode holds this content.
    pub fn is_duplicated(&self) -> bool {
        self.links.len() > 1
    }
}

/// One `<hash>\t<links>\t<path>` line per file.
impl fmt::Display for DupeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for set in &self.links {
            for path in &set.paths {
                if !first {
                    writeln!(f)?;
                }
                first = false;
                write!(f, "{}\t{}\t{}", self.hash, set.paths.len(), path.display())?;
            }
        }
        Ok(())
    }
}

/// Index every file under `dirs` by its valid cached hash and return the
/// groups with more than one path. Groups that are a single inode already
/// are kept only when `show_links` is set.
pub fn find_dupes(
    store: &dyn AttrStore,
    dirs: &[PathBuf],
    filter: &ScanFilter,
    show_links: bool,
    progress: &dyn Progress,
) -> (Vec<DupeGroup>, Vec<DocError>) {
    let mut index = Commit::new();
    let mut identities: HashMap<usize, FileIdentity> = HashMap::new();
    let mut errors = Vec::new();
    let mut seen_bytes = 0u64;

    for dir in dirs {
        for entry in files(dir, filter) {
            let result = entry.and_then(|entry| {
                let meta = entry.metadata()?;
                let hash = cached_hash(store, entry.path(), &meta)?;
                Ok((entry, meta, hash))
            });
            let (entry, meta, hash) = match result {
                Ok(found) => found,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            let Some(hash) = hash else {
                tracing::trace!(path = %entry.path().display(), "no valid hash");
                continue;
            };
            let Some(path) = entry.path().to_str() else {
                errors.push(DocError::NonUtf8Path {
                    path: entry.path().to_path_buf(),
                });
                continue;
            };
            // Overlapping directories walk the same file twice.
            if index.index_of(path).is_some() {
                continue;
            }
            seen_bytes += meta.len();
            progress.report(seen_bytes, seen_bytes, path);
            let idx = index.upsert(CommitEntry::file(path, hash));
            identities.insert(idx, FileIdentity::from_metadata(&meta));
        }
    }
    progress.finish();

    if index.is_empty() {
        return (Vec::new(), errors);
    }

    let mut groups = Vec::new();
    let mut done: HashSet<&Multihash> = HashSet::new();
    for entry in index.entries() {
        let Some(hash) = entry.hash.as_ref() else {
            continue;
        };
        if !done.insert(hash) {
            continue;
        }
        let members: Vec<&CommitEntry> = index.by_hash(hash).collect();
        if members.len() < 2 {
            continue;
        }

        let mut links: Vec<LinkSet> = Vec::new();
        for member in members {
            let Some(identity) = index
                .index_of(&member.path)
                .and_then(|idx| identities.get(&idx))
            else {
                continue;
            };
            let path = PathBuf::from(&member.path);
            match links.iter_mut().find(|set| &set.identity == identity) {
                Some(set) => set.paths.push(path),
                None => links.push(LinkSet {
                    identity: identity.clone(),
                    paths: vec![path],
                }),
            }
        }
        let group = DupeGroup {
            hash: hash.clone(),
            links,
        };
        if group.is_duplicated() || show_links {
            groups.push(group);
        }
    }
    (groups, errors)
}

/// Hard-link every inode of `group` to the first one on the same device.
///
/// Each replaced path is linked under a temporary name first and renamed over
/// the original, so a failure leaves the duplicate in place.
pub fn deduplicate(group: &DupeGroup) -> Result<usize, DocError> {
    let mut first_on_device: HashMap<u64, &Path> = HashMap::new();
    let mut replaced = 0;
    for set in &group.links {
        let &FileIdentity::DevInode { dev, .. } = &set.identity else {
            continue;
        };
        let Some(first) = set.paths.first() else {
            continue;
        };
        let source = match first_on_device.get(&dev).copied() {
            Some(source) => source,
            None => {
                first_on_device.insert(dev, first);
                continue;
            }
        };
        for path in &set.paths {
            replace_with_link(source, path)?;
            tracing::debug!(path = %path.display(), source = %source.display(), "linked duplicate");
            replaced += 1;
        }
    }
    Ok(replaced)
}

fn replace_with_link(source: &Path, target: &Path) -> Result<(), DocError> {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = target.with_file_name(format!(".{}.doctrack-link", name));
    fs::hard_link(source, &tmp).map_err(|e| DocError::io_at(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(DocError::io_at(target, e));
    }
    Ok(())
}
