//! Conflict copies: naming and cross-referencing.
//!
//! When two versions of a file meet, the incoming one is stored next to the
//! existing one under `<path>.<base58 hash><ext>`, or `<path>.<hash>.<n><ext>`
//! if that name holds different content. The copy records which file it
//! shadows (`user.doc.conflict`) and the original lists its alternatives
//! (`user.doc.conflict.<n>`).

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::attrs::{AttrStore, XATTR_CONFLICT};
use crate::error::DocError;
use crate::hash::{get_hash, Multihash};

/// Candidate name for a conflict copy of `path` with content `digest`.
///
/// Returns `None` when an existing candidate already holds exactly that
/// content, so the conflict has been recorded before.
pub fn find_conflict_file_name(
    store: &dyn AttrStore,
    path: &Path,
    digest: &Multihash,
) -> Result<Option<PathBuf>, DocError> {
    let ext = path
        .extension()
        .map(|e| {
            let mut dotted = OsString::from(".");
            dotted.push(e);
            dotted
        })
        .unwrap_or_default();
    let mut base = path.as_os_str().to_os_string();
    base.push(".");
    base.push(digest.to_base58());

    let mut attempt: Option<u64> = None;
    loop {
        let mut candidate = base.clone();
        if let Some(n) = attempt {
            candidate.push(format!(".{}", n));
        }
        candidate.push(&ext);
        let candidate = PathBuf::from(candidate);

        let meta = match std::fs::symlink_metadata(&candidate) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Some(candidate)),
            Err(e) => return Err(DocError::io_at(&candidate, e)),
        };
        if !meta.is_dir() && get_hash(store, &candidate, &meta, true)?.as_ref() == Some(digest) {
            return Ok(None);
        }
        attempt = Some(attempt.map_or(0, |n| n + 1));
    }
}

/// Base name of the file `path` is a conflict copy of, if it is one.
pub fn conflict_of(store: &dyn AttrStore, path: &Path) -> Result<Option<String>, DocError> {
    Ok(store
        .get(path, XATTR_CONFLICT)?
        .map(|v| String::from_utf8_lossy(&v).into_owned())
        .filter(|name| !name.is_empty()))
}

pub fn mark_conflict_for(store: &dyn AttrStore, path: &Path, original: &str) -> Result<(), DocError> {
    store.set(path, XATTR_CONFLICT, original.as_bytes())
}

/// Record `alternative` in the first free `user.doc.conflict.<n>` slot of
/// `path`, unless some slot already names it.
pub fn add_conflict_alternative(
    store: &dyn AttrStore,
    path: &Path,
    alternative: &str,
) -> Result<(), DocError> {
    for n in 0u64.. {
        let name = format!("{}.{}", XATTR_CONFLICT, n);
        if store.create_exclusive(path, &name, alternative.as_bytes())? {
            return Ok(());
        }
        if store.get(path, &name)?.as_deref() == Some(alternative.as_bytes()) {
            return Ok(());
        }
    }
    Ok(())
}

/// Drop every `user.doc.conflict.<n>` slot of `path`. A fresh conflict copy
/// inherits its source's attributes, alternatives included.
pub fn clear_conflict_alternatives(store: &dyn AttrStore, path: &Path) -> Result<(), DocError> {
    let prefix = format!("{}.", XATTR_CONFLICT);
    for name in store.list(path)? {
        let is_slot = name
            .strip_prefix(&prefix)
            .is_some_and(|n| n.parse::<u64>().is_ok());
        if is_slot {
            store.remove(path, &name)?;
        }
    }
    Ok(())
}

/// Alternatives recorded on `path`, in slot order.
pub fn conflict_alternatives(store: &dyn AttrStore, path: &Path) -> Result<Vec<String>, DocError> {
    let prefix = format!("{}.", XATTR_CONFLICT);
    let mut slots: Vec<(u64, String)> = Vec::new();
    for name in store.list(path)? {
        let Some(n) = name.strip_prefix(&prefix).and_then(|n| n.parse::<u64>().ok()) else {
            continue;
        };
        if let Some(value) = store.get(path, &name)? {
            slots.push((n, String::from_utf8_lossy(&value).into_owned()));
        }
    }
    slots.sort();
    Ok(slots.into_iter().map(|(_, v)| v).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::DirStore;
    use crate::hash::hash_bytes;

    fn setup() -> (tempfile::TempDir, DirStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(".dirstore"));
        (tmp, store)
    }

    #[test]
    fn first_candidate_keeps_the_extension() {
        let (tmp, store) = setup();
        let path = tmp.path().join("a.txt");
        let h = hash_bytes(b"v1");

        let name = find_conflict_file_name(&store, &path, &h).unwrap().unwrap();
        assert_eq!(name, tmp.path().join(format!("a.txt.{}.txt", h)));
    }

    #[test]
    fn existing_copy_with_same_content_means_nothing_to_do() {
        let (tmp, store) = setup();
        let path = tmp.path().join("a.txt");
        let h = hash_bytes(b"v1");
        std::fs::write(tmp.path().join(format!("a.txt.{}.txt", h)), "v1").unwrap();

        assert_eq!(find_conflict_file_name(&store, &path, &h).unwrap(), None);
    }

    #[test]
    fn occupied_candidates_get_a_counter() {
        let (tmp, store) = setup();
        let path = tmp.path().join("a.txt");
        let h = hash_bytes(b"v1");
        std::fs::write(tmp.path().join(format!("a.txt.{}.txt", h)), "other").unwrap();
        std::fs::write(tmp.path().join(format!("a.txt.{}.0.txt", h)), "other").unwrap();

        let name = find_conflict_file_name(&store, &path, &h).unwrap().unwrap();
        assert_eq!(name, tmp.path().join(format!("a.txt.{}.1.txt", h)));
    }

    #[test]
    fn names_without_extension() {
        let (tmp, store) = setup();
        let path = tmp.path().join("Makefile");
        let h = hash_bytes(b"all:");
        let name = find_conflict_file_name(&store, &path, &h).unwrap().unwrap();
        assert_eq!(name, tmp.path().join(format!("Makefile.{}", h)));
    }

    #[test]
    fn alternatives_fill_slots_once() {
        let (tmp, store) = setup();
        let original = tmp.path().join("a.txt");
        let copy = tmp.path().join("a.txt.X.txt");
        std::fs::write(&original, "v2").unwrap();
        std::fs::write(&copy, "v1").unwrap();

        mark_conflict_for(&store, &copy, "a.txt").unwrap();
        add_conflict_alternative(&store, &original, "a.txt.X.txt").unwrap();
        add_conflict_alternative(&store, &original, "a.txt.Y.txt").unwrap();
        add_conflict_alternative(&store, &original, "a.txt.X.txt").unwrap();

        assert_eq!(conflict_of(&store, &copy).unwrap().as_deref(), Some("a.txt"));
        assert_eq!(conflict_of(&store, &original).unwrap(), None);
        assert_eq!(
            conflict_alternatives(&store, &original).unwrap(),
            vec!["a.txt.X.txt", "a.txt.Y.txt"]
        );
    }

    #[test]
    fn clearing_alternatives_keeps_other_attributes() {
        let (tmp, store) = setup();
        let path = tmp.path().join("a.txt");
        std::fs::write(&path, "v").unwrap();
        mark_conflict_for(&store, &path, "orig.txt").unwrap();
        add_conflict_alternative(&store, &path, "a.txt.X.txt").unwrap();
        add_conflict_alternative(&store, &path, "a.txt.Y.txt").unwrap();

        clear_conflict_alternatives(&store, &path).unwrap();
        assert!(conflict_alternatives(&store, &path).unwrap().is_empty());
        assert_eq!(conflict_of(&store, &path).unwrap().as_deref(), Some("orig.txt"));
    }
}
