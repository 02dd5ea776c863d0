//! SHA-1 content hashing for files, symlinks and in-memory buffers.

use std::fs::File;
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use sha1::{Digest, Sha1};

use super::Multihash;
use crate::error::DocError;

/// Buffer size for hashing: 64KB.
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Hash the content of `path`.
///
/// A symlink is not followed: its hash is the hash of the link target string.
pub fn hash_file(path: &Path) -> Result<Multihash, DocError> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| not_found_or(path, e))?;
    if meta.file_type().is_symlink() {
        let target = std::fs::read_link(path).map_err(|e| DocError::io_at(path, e))?;
        return Ok(hash_bytes(target.as_os_str().as_bytes()));
    }

    let file = File::open(path).map_err(|e| not_found_or(path, e))?;
    hash_reader(file).map_err(|e| DocError::io_at(path, e))
}

pub fn hash_reader(mut reader: impl Read) -> std::io::Result<Multihash> {
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(Multihash::from_sha1(&hasher.finalize()))
}

pub fn hash_bytes(data: &[u8]) -> Multihash {
    Multihash::from_sha1(&Sha1::digest(data))
}

fn not_found_or(path: &Path, e: std::io::Error) -> DocError {
    match e.kind() {
        std::io::ErrorKind::NotFound => DocError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => DocError::io_at(path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_file_matches_hash_bytes() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        let data = vec![7u8; HASH_BUF_SIZE * 2 + 13];
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        assert_eq!(hash_file(tmp.path()).unwrap(), hash_bytes(&data));
    }

    #[test]
    fn symlink_hashes_its_target_string() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("does/not/exist", &link).unwrap();

        assert_eq!(hash_file(&link).unwrap(), hash_bytes(b"does/not/exist"));
    }

    #[test]
    fn missing_file_is_source_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = hash_file(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, DocError::SourceNotFound { .. }));
    }
}
