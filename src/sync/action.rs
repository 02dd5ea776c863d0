use std::fmt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;

use crate::attrs::AttrStore;
use crate::error::DocError;
use crate::hash::{commit_file_hash, Multihash};
use crate::transfer::conflict::{
    add_conflict_alternative, clear_conflict_alternatives, mark_conflict_for,
};
use crate::transfer::copy::{copy_file, mkdir_from};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl EntryKind {
    pub fn of(meta: &Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_symlink() {
            EntryKind::Symlink
        } else if ft.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        }
    }
}

fn size_of(meta: &Metadata) -> u64 {
    if meta.file_type().is_file() {
        meta.len()
    } else {
        0
    }
}

/// One planned mutation of a destination tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAction {
    pub src: PathBuf,
    pub dst: PathBuf,
    /// Content hash of `src`, when it was known at planning time.
    pub hash: Option<Multihash>,
    pub size: u64,
    pub src_kind: EntryKind,
    /// For conflict copies: the existing file `dst` sits beside.
    pub original_dst: Option<PathBuf>,
    pub orig_dst_kind: Option<EntryKind>,
    pub conflict: bool,
    /// Hard-link `src` to `dst` instead of copying.
    pub link: bool,
}

/// Result of running one action.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    pub bytes: u64,
    /// Non-fatal failures: ownership, times or attributes not replicated.
    pub warnings: Vec<DocError>,
}

impl CopyAction {
    /// Copy a file or symlink, or create a directory, at a missing `dst`.
    pub fn new(
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        hash: Option<Multihash>,
        src_meta: &Metadata,
    ) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            hash,
            size: size_of(src_meta),
            src_kind: EntryKind::of(src_meta),
            original_dst: None,
            orig_dst_kind: None,
            conflict: false,
            link: false,
        }
    }

    /// Store `src` beside `original_dst` under the conflict name `dst`.
    pub fn conflict(
        src: impl Into<PathBuf>,
        dst: impl Into<PathBuf>,
        hash: Multihash,
        src_meta: &Metadata,
        original_dst: impl Into<PathBuf>,
        orig_meta: &Metadata,
    ) -> Self {
        Self {
            original_dst: Some(original_dst.into()),
            orig_dst_kind: Some(EntryKind::of(orig_meta)),
            conflict: true,
            ..Self::new(src, dst, Some(hash), src_meta)
        }
    }

    pub fn is_dir(&self) -> bool {
        self.src_kind == EntryKind::Dir
    }

    /// Perform the mutation, then tag conflicts and record the hash.
    pub fn run(&self, store: &dyn AttrStore) -> Result<ActionOutcome, DocError> {
        let mut outcome = ActionOutcome::default();
        if self.link {
            std::fs::hard_link(&self.src, &self.dst).map_err(|e| DocError::io_at(&self.dst, e))?;
        } else if self.is_dir() {
            outcome.warnings = mkdir_from(store, &self.src, &self.dst)?;
        } else {
            let (bytes, warnings) = copy_file(store, &self.src, &self.dst)?;
            outcome.bytes = bytes;
            outcome.warnings = warnings;
        }

        if self.conflict {
            if let Err(e) = self.tag_conflict(store) {
                outcome.warnings.push(e);
            }
        }

        if self.src_kind == EntryKind::File {
            if let Some(hash) = &self.hash {
                let recorded = std::fs::symlink_metadata(&self.dst)
                    .map_err(|e| DocError::io_at(&self.dst, e))
                    .and_then(|meta| commit_file_hash(store, &self.dst, &meta, hash, true));
                if let Err(e) = recorded {
                    outcome.warnings.push(e);
                }
            }
        }
        Ok(outcome)
    }

    fn tag_conflict(&self, store: &dyn AttrStore) -> Result<(), DocError> {
        let Some(original) = &self.original_dst else {
            return Ok(());
        };
        if self.src_kind != EntryKind::Symlink {
            clear_conflict_alternatives(store, &self.dst)?;
            mark_conflict_for(store, &self.dst, &base_name(original))?;
        }
        if self.orig_dst_kind != Some(EntryKind::Symlink) {
            add_conflict_alternative(store, original, &base_name(&self.dst))?;
        }
        Ok(())
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl fmt::Display for CopyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.link {
            return write!(f, "  LINK      {} <= {}", self.dst.display(), self.src.display());
        }
        if self.conflict {
            return write!(
                f,
                "  CONFLICT  {} ({})",
                self.dst.display(),
                ByteSize(self.size)
            );
        }
        match self.src_kind {
            EntryKind::Dir => write!(f, "  MKDIR     {}", self.dst.display()),
            EntryKind::Symlink => write!(f, "  SYMLINK   {}", self.dst.display()),
            EntryKind::File => write!(
                f,
                "  COPY      {} ({})",
                self.dst.display(),
                ByteSize(self.size)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrs::{DirStore, XATTR_CONFLICT};
    use crate::hash::{get_hash, hash_bytes};
    use crate::transfer::conflict::{conflict_alternatives, conflict_of};

    fn setup() -> (tempfile::TempDir, DirStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(".dirstore"));
        (tmp, store)
    }

    #[test]
    fn copy_records_the_known_hash() {
        let (tmp, store) = setup();
        let src = tmp.path().join("a.txt");
        let dst = tmp.path().join("b.txt");
        std::fs::write(&src, "abc").unwrap();
        let meta = std::fs::symlink_metadata(&src).unwrap();
        let act = CopyAction::new(&src, &dst, Some(hash_bytes(b"abc")), &meta);

        let outcome = act.run(&store).unwrap();
        assert_eq!(outcome.bytes, 3);
        let dst_meta = std::fs::symlink_metadata(&dst).unwrap();
        assert_eq!(
            get_hash(&store, &dst, &dst_meta, false).unwrap(),
            Some(hash_bytes(b"abc"))
        );
    }

    #[test]
    fn conflict_copy_is_cross_referenced() {
        let (tmp, store) = setup();
        let src = tmp.path().join("src.txt");
        let original = tmp.path().join("a.txt");
        let dst = tmp.path().join("a.txt.H.txt");
        std::fs::write(&src, "v1").unwrap();
        std::fs::write(&original, "v2").unwrap();
        let src_meta = std::fs::symlink_metadata(&src).unwrap();
        let orig_meta = std::fs::symlink_metadata(&original).unwrap();
        let act = CopyAction::conflict(&src, &dst, hash_bytes(b"v1"), &src_meta, &original, &orig_meta);

        let outcome = act.run(&store).unwrap();
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "v1");
        assert_eq!(conflict_of(&store, &dst).unwrap().as_deref(), Some("a.txt"));
        assert_eq!(
            conflict_alternatives(&store, &original).unwrap(),
            vec!["a.txt.H.txt"]
        );
        assert_eq!(store.get(&original, XATTR_CONFLICT).unwrap(), None);
    }

    #[test]
    fn display_lines() {
        let (tmp, _store) = setup();
        let src = tmp.path().join("a.txt");
        std::fs::write(&src, "abc").unwrap();
        let meta = std::fs::symlink_metadata(&src).unwrap();
        let mut act = CopyAction::new(&src, tmp.path().join("b.txt"), None, &meta);
        assert!(act.to_string().starts_with("  COPY      "));
        assert!(act.to_string().ends_with("(3 B)"));
        act.link = true;
        assert!(act.to_string().starts_with("  LINK      "));
    }
}
