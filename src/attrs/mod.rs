//! Named binary attributes attached to filesystem entries.
//!
//! The primary backend is the kernel's `user.*` extended attributes. Trees on
//! filesystems without them can carry a `.dirstore` directory, which keeps one
//! small file per (inode, attribute) pair.

pub mod dirstore;
pub mod xattr;

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::{is_unsupported, DocError};

pub use dirstore::DirStore;
pub use xattr::XattrStore;

/// Cached content hash (multihash envelope bytes).
pub const XATTR_HASH: &str = "user.doc.multihash";
/// Modification time the cached hash was computed for (RFC 3339, nanoseconds).
pub const XATTR_HASH_TIME: &str = "user.doc.multihash.time";
/// Set on a conflict copy: the base name of the file it conflicts with.
pub const XATTR_CONFLICT: &str = "user.doc.conflict";
/// Integrity tag of a commit log: the hash of its own content.
pub const XATTR_COMMIT: &str = "user.doc.commit";

pub trait AttrStore: Send + Sync {
    /// Read an attribute. `Ok(None)` when the entry has no such attribute.
    fn get(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, DocError>;

    /// Create or overwrite an attribute.
    fn set(&self, path: &Path, name: &str, value: &[u8]) -> Result<(), DocError>;

    /// Create an attribute only if it does not exist yet.
    ///
    /// Returns `Ok(false)` when the attribute was already present.
    fn create_exclusive(&self, path: &Path, name: &str, value: &[u8]) -> Result<bool, DocError>;

    /// Names of all attributes on the entry.
    fn list(&self, path: &Path) -> Result<Vec<String>, DocError>;

    fn remove(&self, path: &Path, name: &str) -> Result<(), DocError>;

    /// Set an attribute, temporarily granting the owner write permission if the
    /// entry is read-only and `force` is set.
    ///
    /// Returns whether the write permission had to be forced.
    fn set_forced(
        &self,
        path: &Path,
        name: &str,
        value: &[u8],
        force: bool,
    ) -> Result<bool, DocError> {
        match self.set(path, name, value) {
            Ok(()) => Ok(false),
            Err(err) if force && err.is_permission_denied() => {
                let meta =
                    std::fs::symlink_metadata(path).map_err(|e| DocError::io_at(path, e))?;
                let mode = meta.permissions().mode();
                tracing::debug!(path = %path.display(), mode = format!("{:o}", mode), "forcing owner write");
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o200))
                    .map_err(|e| DocError::io_at(path, e))?;
                let result = self.set(path, name, value);
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| DocError::io_at(path, e))?;
                result.map(|()| true)
            }
            Err(err) => Err(err),
        }
    }
}

/// Extended attributes where the filesystem has them, the nearest `.dirstore`
/// otherwise.
#[derive(Debug, Default)]
pub struct FsAttrStore {
    xattr: XattrStore,
}

impl FsAttrStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `op` against the kernel store, retrying against the nearest
    /// `.dirstore` when the filesystem rejects extended attributes.
    fn with_fallback<T>(
        &self,
        path: &Path,
        name: &str,
        op: impl Fn(&dyn AttrStore) -> Result<T, DocError>,
        missing: Option<T>,
    ) -> Result<T, DocError> {
        match op(&self.xattr) {
            Err(DocError::Attr { source, .. }) if is_unsupported(&source) => {
                match (DirStore::find(path), missing) {
                    (Some(store), _) => op(&store),
                    (None, Some(value)) => Ok(value),
                    (None, None) => Err(DocError::attr(path, name, source)),
                }
            }
            other => other,
        }
    }
}

impl AttrStore for FsAttrStore {
    fn get(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, DocError> {
        self.with_fallback(path, name, |s| s.get(path, name), Some(None))
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> Result<(), DocError> {
        self.with_fallback(path, name, |s| s.set(path, name, value), None)
    }

    fn create_exclusive(&self, path: &Path, name: &str, value: &[u8]) -> Result<bool, DocError> {
        self.with_fallback(
            path,
            name,
            |s| s.create_exclusive(path, name, value),
            None,
        )
    }

    fn list(&self, path: &Path) -> Result<Vec<String>, DocError> {
        self.with_fallback(path, "*", |s| s.list(path), Some(Vec::new()))
    }

    fn remove(&self, path: &Path, name: &str) -> Result<(), DocError> {
        self.with_fallback(path, name, |s| s.remove(path, name), Some(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_forced_restores_read_only_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(".dirstore"));
        let file = tmp.path().join("ro.txt");
        std::fs::write(&file, "x").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o444)).unwrap();

        // The dirstore never needs write access to the file itself.
        let forced = store.set_forced(&file, XATTR_HASH, b"h", true).unwrap();
        assert!(!forced);
        assert_eq!(store.get(&file, XATTR_HASH).unwrap().unwrap(), b"h");

        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o444);
    }

    #[test]
    fn fs_store_round_trips_with_a_dirstore_present() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(dirstore::DIRSTORE_NAME)).unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();

        let store = FsAttrStore::new();
        store.set(&file, XATTR_CONFLICT, b"orig.txt").unwrap();
        assert_eq!(
            store.get(&file, XATTR_CONFLICT).unwrap().as_deref(),
            Some(&b"orig.txt"[..])
        );
        assert!(store.list(&file).unwrap().contains(&XATTR_CONFLICT.to_string()));
        store.remove(&file, XATTR_CONFLICT).unwrap();
        assert_eq!(store.get(&file, XATTR_CONFLICT).unwrap(), None);
    }
}
