//! Attribute fallback for filesystems without extended attributes.
//!
//! Layout: `<root>/.dirstore/<inode>.inode/<attribute name>.xattr`, one file per
//! value. Entries are keyed by inode, so renames inside the tree keep their
//! attributes while a rewrite-and-rename gets a fresh set.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use super::AttrStore;
use crate::error::DocError;

pub const DIRSTORE_NAME: &str = ".dirstore";
const INODE_SUFFIX: &str = ".inode";
const VALUE_SUFFIX: &str = ".xattr";

#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Store rooted at an explicit `.dirstore` directory (created on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locate the nearest `.dirstore` at or above `path`.
    pub fn find(path: &Path) -> Option<Self> {
        let start = std::path::absolute(path).ok()?;
        start
            .ancestors()
            .map(|dir| dir.join(DIRSTORE_NAME))
            .find(|candidate| candidate.is_dir())
            .map(Self::new)
    }

    fn inode_dir(&self, path: &Path) -> Result<PathBuf, DocError> {
        let meta = fs::symlink_metadata(path).map_err(|e| DocError::io_at(path, e))?;
        Ok(self.root.join(format!("{}{}", meta.ino(), INODE_SUFFIX)))
    }

    fn value_file(&self, path: &Path, name: &str) -> Result<PathBuf, DocError> {
        if name.contains('/') || name.is_empty() {
            return Err(DocError::attr(
                path,
                name,
                io::Error::new(io::ErrorKind::InvalidInput, "invalid attribute name"),
            ));
        }
        Ok(self.inode_dir(path)?.join(format!("{}{}", name, VALUE_SUFFIX)))
    }

    fn ensure_inode_dir(&self, path: &Path, name: &str) -> Result<(), DocError> {
        let dir = self.inode_dir(path)?;
        fs::create_dir_all(&dir).map_err(|e| DocError::attr(path, name, e))
    }
}

impl AttrStore for DirStore {
    fn get(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, DocError> {
        let file = self.value_file(path, name)?;
        match fs::read(&file) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DocError::attr(path, name, e)),
        }
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> Result<(), DocError> {
        let file = self.value_file(path, name)?;
        self.ensure_inode_dir(path, name)?;
        fs::write(&file, value).map_err(|e| DocError::attr(path, name, e))
    }

    fn create_exclusive(&self, path: &Path, name: &str, value: &[u8]) -> Result<bool, DocError> {
        let file = self.value_file(path, name)?;
        self.ensure_inode_dir(path, name)?;
        let mut out = match OpenOptions::new().write(true).create_new(true).open(&file) {
            Ok(out) => out,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(DocError::attr(path, name, e)),
        };
        out.write_all(value)
            .map_err(|e| DocError::attr(path, name, e))?;
        Ok(true)
    }

    fn list(&self, path: &Path) -> Result<Vec<String>, DocError> {
        let dir = self.inode_dir(path)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DocError::attr(path, "*", e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DocError::attr(path, "*", e))?;
            let file_name = entry.file_name();
            if let Some(name) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(VALUE_SUFFIX))
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn remove(&self, path: &Path, name: &str) -> Result<(), DocError> {
        let file = self.value_file(path, name)?;
        match fs::remove_file(&file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocError::attr(path, name, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_keyed_by_inode() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(DIRSTORE_NAME));
        let file = tmp.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        store.set(&file, "user.doc.multihash", b"hash").unwrap();

        let ino = fs::metadata(&file).unwrap().ino();
        let value_path = tmp
            .path()
            .join(DIRSTORE_NAME)
            .join(format!("{}.inode", ino))
            .join("user.doc.multihash.xattr");
        assert_eq!(fs::read(value_path).unwrap(), b"hash");

        // A rename keeps the inode and therefore the attribute.
        let renamed = tmp.path().join("b.txt");
        fs::rename(&file, &renamed).unwrap();
        assert_eq!(
            store.get(&renamed, "user.doc.multihash").unwrap().unwrap(),
            b"hash"
        );
    }

    #[test]
    fn exclusive_create_and_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(DIRSTORE_NAME));
        let file = tmp.path().join("f");
        fs::write(&file, "x").unwrap();

        assert!(store.list(&file).unwrap().is_empty());
        assert!(store.create_exclusive(&file, "user.doc.conflict.0", b"x").unwrap());
        assert!(!store.create_exclusive(&file, "user.doc.conflict.0", b"y").unwrap());
        assert!(store.create_exclusive(&file, "user.doc.conflict.1", b"y").unwrap());
        assert_eq!(
            store.list(&file).unwrap(),
            vec!["user.doc.conflict.0", "user.doc.conflict.1"]
        );
        store.remove(&file, "user.doc.conflict.0").unwrap();
        store.remove(&file, "user.doc.conflict.0").unwrap();
        assert_eq!(store.list(&file).unwrap(), vec!["user.doc.conflict.1"]);
    }

    #[test]
    fn find_walks_upward() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join(DIRSTORE_NAME)).unwrap();
        let nested = tmp.path().join("x/y");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("f");
        fs::write(&file, "f").unwrap();

        let store = DirStore::find(&file).unwrap();
        assert_eq!(store.root, tmp.path().join(DIRSTORE_NAME));
    }

    #[test]
    fn missing_entry_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(DIRSTORE_NAME));
        assert!(store.get(&tmp.path().join("nope"), "user.doc.multihash").is_err());
    }
}
