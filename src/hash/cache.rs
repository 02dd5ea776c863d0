//! Hash cache stored next to each file.
//!
//! The cached hash is trusted only while the file's modification time equals
//! the recorded hash time exactly (nanosecond precision).

use std::fs::Metadata;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

use super::{hash_file, Multihash};
use crate::attrs::{AttrStore, XATTR_HASH, XATTR_HASH_TIME};
use crate::error::DocError;

pub fn mtime_of(path: &Path, meta: &Metadata) -> Result<DateTime<Utc>, DocError> {
    meta.modified()
        .map(DateTime::<Utc>::from)
        .map_err(|e| DocError::io_at(path, e))
}

pub fn format_hash_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// The modification time the cached hash was computed for. An unparseable
/// value reads as absent.
pub fn hash_time(store: &dyn AttrStore, path: &Path) -> Result<Option<DateTime<Utc>>, DocError> {
    let Some(raw) = store.get(path, XATTR_HASH_TIME)? else {
        return Ok(None);
    };
    let parsed = std::str::from_utf8(&raw)
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok());
    if parsed.is_none() {
        tracing::debug!(path = %path.display(), "unparseable hash time, ignoring cache");
    }
    Ok(parsed.map(|t| t.with_timezone(&Utc)))
}

/// The recorded hash, whether or not it is still valid.
pub fn recorded_hash(store: &dyn AttrStore, path: &Path) -> Result<Option<Multihash>, DocError> {
    Ok(store
        .get(path, XATTR_HASH)?
        .and_then(|bytes| Multihash::from_bytes(bytes).ok()))
}

/// The cached hash if it is still valid for `meta`'s modification time.
pub fn cached_hash(
    store: &dyn AttrStore,
    path: &Path,
    meta: &Metadata,
) -> Result<Option<Multihash>, DocError> {
    match hash_time(store, path)? {
        Some(recorded) if recorded == mtime_of(path, meta)? => recorded_hash(store, path),
        _ => Ok(None),
    }
}

/// Cached hash when valid, otherwise the freshly computed hash when `compute`
/// is set, otherwise `None`.
pub fn get_hash(
    store: &dyn AttrStore,
    path: &Path,
    meta: &Metadata,
    compute: bool,
) -> Result<Option<Multihash>, DocError> {
    if let Some(hash) = cached_hash(store, path, meta)? {
        return Ok(Some(hash));
    }
    if compute {
        return hash_file(path).map(Some);
    }
    Ok(None)
}

/// Record `hash` as the hash of `path` at `meta`'s modification time.
///
/// Each attribute is written only when its stored value differs. Returns
/// whether a read-only file had to be made writable for the update.
pub fn commit_file_hash(
    store: &dyn AttrStore,
    path: &Path,
    meta: &Metadata,
    hash: &Multihash,
    force: bool,
) -> Result<bool, DocError> {
    let mut forced = false;
    if store.get(path, XATTR_HASH)?.as_deref() != Some(hash.as_bytes()) {
        forced |= store.set_forced(path, XATTR_HASH, hash.as_bytes(), force)?;
    }
    let time = format_hash_time(&mtime_of(path, meta)?);
    if store.get(path, XATTR_HASH_TIME)?.as_deref() != Some(time.as_bytes()) {
        forced |= store.set_forced(path, XATTR_HASH_TIME, time.as_bytes(), force)?;
    }
    Ok(forced)
}
