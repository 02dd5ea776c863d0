//! Commit log: the recorded state of a tracked tree.
//!
//! Entries live in an arena; the path, hash and identity indexes refer to
//! arena slots. Dropping an entry empties its slot, so indexes held by callers
//! stay meaningful for the lifetime of the `Commit`.

pub mod docattr;
pub mod entry;
pub mod format;
pub mod log;

use std::collections::{BTreeMap, HashMap};

use crate::hash::Multihash;

pub use entry::{CommitEntry, FileIdentity};
pub use log::{find_log, init, open_dir_append, read_commit, write_dir_append, IntegrityPolicy};

/// File name of the commit log at the root of a tracked tree.
pub const DOCCOMMIT: &str = ".doccommit";

#[derive(Debug, Default)]
pub struct Commit {
    slots: Vec<Option<CommitEntry>>,
    by_path: HashMap<String, usize>,
    by_hash: HashMap<Multihash, Vec<usize>>,
    by_identity: HashMap<(bool, FileIdentity), usize>,
    attrs: BTreeMap<String, BTreeMap<String, String>>,
}

impl Commit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records in file order. A later record for a path replaces an
    /// earlier one in place.
    pub fn from_entries(entries: impl IntoIterator<Item = CommitEntry>) -> Self {
        let mut commit = Self::new();
        for entry in entries {
            commit.upsert(entry);
        }
        commit
    }

    /// Insert an entry, replacing the live entry with the same path in place.
    pub fn upsert(&mut self, entry: CommitEntry) -> usize {
        match self.by_path.get(&entry.path).copied() {
            Some(idx) => {
                self.unindex(idx);
                self.slots[idx] = Some(entry);
                self.index(idx);
                idx
            }
            None => {
                self.slots.push(Some(entry));
                let idx = self.slots.len() - 1;
                self.index(idx);
                idx
            }
        }
    }

    fn index(&mut self, idx: usize) {
        let Some(entry) = self.slots[idx].as_ref() else {
            return;
        };
        self.by_path.insert(entry.path.clone(), idx);
        if let Some(hash) = &entry.hash {
            self.by_hash.entry(hash.clone()).or_default().push(idx);
        }
        let Some(identity) = entry.identity.clone() else {
            return;
        };
        let key = (entry.is_dir(), identity);
        if let Some(previous) = self.by_identity.insert(key, idx) {
            // Two live entries cannot share an identity; the newer one keeps it.
            if previous != idx {
                if let Some(prev_entry) = self.slots[previous].as_mut() {
                    tracing::debug!(path = %prev_entry.path, "identity moved to a newer entry");
                    prev_entry.identity = None;
                }
            }
        }
    }

    fn unindex(&mut self, idx: usize) {
        let Some(entry) = self.slots[idx].as_ref() else {
            return;
        };
        if self.by_path.get(&entry.path) == Some(&idx) {
            self.by_path.remove(&entry.path);
        }
        if let Some(hash) = &entry.hash {
            if let Some(list) = self.by_hash.get_mut(hash) {
                list.retain(|&i| i != idx);
                if list.is_empty() {
                    self.by_hash.remove(hash);
                }
            }
        }
        if let Some(identity) = &entry.identity {
            let key = (entry.is_dir(), identity.clone());
            if self.by_identity.get(&key) == Some(&idx) {
                self.by_identity.remove(&key);
            }
        }
    }

    pub fn get(&self, idx: usize) -> Option<&CommitEntry> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// Live entries in log order.
    pub fn entries(&self) -> impl Iterator<Item = &CommitEntry> {
        self.slots.iter().flatten()
    }

    pub fn index_of(&self, path: &str) -> Option<usize> {
        self.by_path.get(path).copied()
    }

    pub fn by_path(&self, path: &str) -> Option<&CommitEntry> {
        self.index_of(path).and_then(|idx| self.get(idx))
    }

    pub fn by_hash(&self, hash: &Multihash) -> impl Iterator<Item = &CommitEntry> {
        self.by_hash
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|&idx| self.get(idx))
    }

    pub fn drop_entry(&mut self, idx: usize) -> Option<CommitEntry> {
        self.unindex(idx);
        self.slots.get_mut(idx).and_then(Option::take)
    }

    /// Drop every entry whose path starts with `prefix`. An empty prefix drops
    /// everything.
    pub fn drop_tree(&mut self, prefix: &str) -> usize {
        let doomed: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.as_ref()
                    .is_some_and(|entry| entry.path.starts_with(prefix))
            })
            .map(|(idx, _)| idx)
            .collect();
        for &idx in &doomed {
            self.drop_entry(idx);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    pub(crate) fn set_attrs(&mut self, attrs: BTreeMap<String, BTreeMap<String, String>>) {
        self.attrs = attrs;
    }

    /// Declared attributes by item, `/` being the directory itself.
    pub fn attrs(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.attrs
    }

    /// Look up a `.docattr` key for `path`: the entry itself first, then each
    /// enclosing directory up to the tree root (`/`).
    pub fn attr(&self, path: &str, key: &str) -> Option<&str> {
        let lookup = |item: &str| {
            self.attrs
                .get(item)
                .and_then(|values| values.get(key))
                .map(String::as_str)
        };
        if let Some(value) = lookup(path) {
            return Some(value);
        }
        let mut rest = path.trim_end_matches('/');
        while let Some(pos) = rest.rfind('/') {
            rest = &rest[..pos];
            if let Some(value) = lookup(&format!("{}/", rest)) {
                return Some(value);
            }
        }
        lookup("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn id(ino: u64) -> FileIdentity {
        FileIdentity::DevInode { dev: 1, ino }
    }

    #[test]
    fn later_records_win_in_place() {
        let c = Commit::from_entries(vec![
            CommitEntry::file("a", hash_bytes(b"1")),
            CommitEntry::file("b", hash_bytes(b"2")),
            CommitEntry::file("a", hash_bytes(b"3")),
        ]);
        assert_eq!(c.len(), 2);
        let paths: Vec<_> = c.entries().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b"]);
        assert_eq!(c.by_path("a").unwrap().hash, Some(hash_bytes(b"3")));
        assert_eq!(c.by_hash(&hash_bytes(b"1")).count(), 0);
    }

    #[test]
    fn hash_index_lists_all_copies() {
        let h = hash_bytes(b"same");
        let c = Commit::from_entries(vec![
            CommitEntry::file("x", h.clone()),
            CommitEntry::file("y", h.clone()),
        ]);
        let mut paths: Vec<_> = c.by_hash(&h).map(|e| e.path.clone()).collect();
        paths.sort();
        assert_eq!(paths, vec!["x", "y"]);
    }

    #[test]
    fn identities_are_unique_per_kind() {
        let mut c = Commit::new();
        c.upsert(CommitEntry::file("old", hash_bytes(b"1")).with_identity(id(7)));
        c.upsert(CommitEntry::dir("d").with_identity(id(7)));
        c.upsert(CommitEntry::file("new", hash_bytes(b"1")).with_identity(id(7)));

        assert_eq!(c.by_path("new").unwrap().identity, Some(id(7)));
        assert_eq!(c.by_path("d/").unwrap().identity, Some(id(7)));
        assert_eq!(c.by_path("old").unwrap().identity, None);
    }

    #[test]
    fn drop_tree_keeps_indexes_consistent() {
        let mut c = Commit::from_entries(vec![
            CommitEntry::dir("sub"),
            CommitEntry::file("sub/a", hash_bytes(b"a")),
            CommitEntry::file("top", hash_bytes(b"t")),
        ]);
        assert_eq!(c.drop_tree("sub/"), 2);
        assert!(c.by_path("sub/a").is_none());
        assert_eq!(c.by_hash(&hash_bytes(b"a")).count(), 0);

        let idx = c.index_of("top").unwrap();
        assert_eq!(c.get(idx).unwrap().hash, Some(hash_bytes(b"t")));
        assert_eq!(c.drop_tree(""), 1);
        assert!(c.get(idx).is_none());
        assert!(c.is_empty());
    }

    #[test]
    fn attributes_inherit_from_enclosing_directories() {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "/".to_string(),
            BTreeMap::from([("backup".to_string(), "yes".to_string())]),
        );
        attrs.insert(
            "docs/".to_string(),
            BTreeMap::from([("backup".to_string(), "no".to_string())]),
        );
        attrs.insert(
            "docs/keep.txt".to_string(),
            BTreeMap::from([("backup".to_string(), "always".to_string())]),
        );
        let mut c = Commit::new();
        c.set_attrs(attrs);

        assert_eq!(c.attr("docs/keep.txt", "backup"), Some("always"));
        assert_eq!(c.attr("docs/deep/x.txt", "backup"), Some("no"));
        assert_eq!(c.attr("other.txt", "backup"), Some("yes"));
        assert_eq!(c.attr("other.txt", "missing"), None);
    }
}
