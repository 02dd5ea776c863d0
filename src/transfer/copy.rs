//! Attribute-preserving copies of single entries.
//!
//! Content goes to a temporary file beside the destination and is renamed into
//! place without replacing anything, so an interrupted copy never leaves a
//! partial file under the final name.

use std::fs::{self, File, FileTimes, Metadata, Permissions};
use std::io::{self, BufReader, BufWriter, Write};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::attrs::AttrStore;
use crate::error::DocError;

/// Buffer size for BufReader/BufWriter: 256KB.
const BUF_SIZE: usize = 256 * 1024;

/// Copy `src` (file or symlink) to the new path `dst`.
///
/// Returns the bytes copied and the non-fatal failures met while replicating
/// ownership, times and attributes.
pub fn copy_file(
    store: &dyn AttrStore,
    src: &Path,
    dst: &Path,
) -> Result<(u64, Vec<DocError>), DocError> {
    let meta = fs::symlink_metadata(src).map_err(|e| source_error(src, e))?;

    if meta.file_type().is_symlink() {
        let target = fs::read_link(src).map_err(|e| source_error(src, e))?;
        std::os::unix::fs::symlink(&target, dst).map_err(|e| DocError::io_at(dst, e))?;
        let mut warnings = Vec::new();
        if let Err(e) = std::os::unix::fs::lchown(dst, Some(meta.uid()), Some(meta.gid())) {
            tracing::debug!(path = %dst.display(), error = %e, "lchown failed");
        }
        copy_attrs(store, src, dst, &mut warnings);
        return Ok((0, warnings));
    }

    let parent = dst
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".doc-copy.")
        .tempfile_in(parent)
        .map_err(|e| DocError::io_at(parent, e))?;

    let src_file = File::open(src).map_err(|e| source_error(src, e))?;
    let mut reader = BufReader::with_capacity(BUF_SIZE, src_file);
    let bytes = {
        let mut writer = BufWriter::with_capacity(BUF_SIZE, tmp.as_file_mut());
        let n = io::copy(&mut reader, &mut writer).map_err(|e| DocError::io_at(dst, e))?;
        writer.flush().map_err(|e| DocError::io_at(dst, e))?;
        n
    };

    let mut warnings = Vec::new();
    copy_attrs(store, src, tmp.path(), &mut warnings);
    if let Err(e) = std::os::unix::fs::fchown(tmp.as_file(), Some(meta.uid()), Some(meta.gid())) {
        tracing::debug!(path = %dst.display(), error = %e, "chown failed");
    }
    if let Err(e) = tmp.as_file().set_times(file_times(&meta)) {
        warnings.push(DocError::io_at(dst, e));
    }
    if let Err(e) = tmp.as_file().set_permissions(Permissions::from_mode(meta.mode() & 0o7777)) {
        warnings.push(DocError::io_at(dst, e));
    }

    tmp.persist_noclobber(dst)
        .map_err(|e| DocError::io_at(dst, e.error))?;
    Ok((bytes, warnings))
}

/// Create directory `dst` after `src`. An existing directory is reused.
pub fn mkdir_from(store: &dyn AttrStore, src: &Path, dst: &Path) -> Result<Vec<DocError>, DocError> {
    let meta = fs::symlink_metadata(src).map_err(|e| source_error(src, e))?;
    match fs::create_dir(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dst.is_dir() => {}
        Err(e) => return Err(DocError::io_at(dst, e)),
    }

    let mut warnings = Vec::new();
    copy_attrs(store, src, dst, &mut warnings);
    if let Err(e) = std::os::unix::fs::lchown(dst, Some(meta.uid()), Some(meta.gid())) {
        tracing::debug!(path = %dst.display(), error = %e, "lchown failed");
    }
    // Owner keeps write and search access so the directory can be populated.
    let mode = (meta.mode() & 0o7777) | 0o300;
    if let Err(e) = fs::set_permissions(dst, Permissions::from_mode(mode)) {
        warnings.push(DocError::io_at(dst, e));
    }
    Ok(warnings)
}

/// Copy every `user.*` attribute of `src` to `dst`.
pub fn copy_attrs(store: &dyn AttrStore, src: &Path, dst: &Path, warnings: &mut Vec<DocError>) {
    let names = match store.list(src) {
        Ok(names) => names,
        Err(e) => {
            warnings.push(e);
            return;
        }
    };
    for name in names.iter().filter(|n| n.starts_with("user.")) {
        let result = store
            .get(src, name)
            .and_then(|value| match value {
                Some(value) => store.set(dst, name, &value),
                None => Ok(()),
            });
        if let Err(e) = result {
            warnings.push(e);
        }
    }
}

fn file_times(meta: &Metadata) -> FileTimes {
    let at = |secs: i64, nanos: i64| {
        if secs >= 0 {
            SystemTime::UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
        } else {
            SystemTime::UNIX_EPOCH - Duration::new(secs.unsigned_abs(), 0) + Duration::from_nanos(nanos as u64)
        }
    };
    FileTimes::new()
        .set_accessed(at(meta.atime(), meta.atime_nsec()))
        .set_modified(at(meta.mtime(), meta.mtime_nsec()))
}

fn source_error(path: &Path, e: io::Error) -> DocError {
    match e.kind() {
        io::ErrorKind::NotFound => DocError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => DocError::io_at(path, e),
    }
}
