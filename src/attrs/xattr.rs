use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use super::AttrStore;
use crate::error::DocError;

/// Kernel extended attributes, read and written without following symlinks.
#[derive(Debug, Default, Clone, Copy)]
pub struct XattrStore;

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn c_name(name: &str) -> io::Result<CString> {
    CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

#[cfg(target_os = "linux")]
mod sys {
    use std::ffi::CString;
    use std::io;
    use std::ptr;

    const NO_ATTR: i32 = libc::ENODATA;

    pub fn get(path: &CString, name: &CString) -> io::Result<Option<Vec<u8>>> {
        loop {
            // SAFETY: both strings are NUL-terminated and outlive the call; a
            // null buffer with size 0 only queries the value length.
            let size = unsafe { libc::lgetxattr(path.as_ptr(), name.as_ptr(), ptr::null_mut(), 0) };
            if size < 0 {
                return missing_or_err(io::Error::last_os_error());
            }
            let mut buf = vec![0u8; size as usize];
            // SAFETY: `buf` is valid for `buf.len()` writable bytes.
            let n = unsafe {
                libc::lgetxattr(
                    path.as_ptr(),
                    name.as_ptr(),
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ERANGE) {
                    // Grew between the two calls.
                    continue;
                }
                return missing_or_err(err);
            }
            buf.truncate(n as usize);
            return Ok(Some(buf));
        }
    }

    fn missing_or_err(err: io::Error) -> io::Result<Option<Vec<u8>>> {
        if err.raw_os_error() == Some(NO_ATTR) {
            Ok(None)
        } else {
            Err(err)
        }
    }

    /// Returns false when `exclusive` is set and the attribute exists.
    pub fn set(path: &CString, name: &CString, value: &[u8], exclusive: bool) -> io::Result<bool> {
        let flags = if exclusive { libc::XATTR_CREATE } else { 0 };
        // SAFETY: `value` is valid for `value.len()` readable bytes.
        let rc = unsafe {
            libc::lsetxattr(
                path.as_ptr(),
                name.as_ptr(),
                value.as_ptr().cast(),
                value.len(),
                flags,
            )
        };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if exclusive && err.raw_os_error() == Some(libc::EEXIST) {
            return Ok(false);
        }
        Err(err)
    }

    pub fn list(path: &CString) -> io::Result<Vec<u8>> {
        loop {
            // SAFETY: size query with a null buffer.
            let size = unsafe { libc::llistxattr(path.as_ptr(), ptr::null_mut(), 0) };
            if size < 0 {
                return Err(io::Error::last_os_error());
            }
            let mut buf = vec![0u8; size as usize];
            // SAFETY: `buf` is valid for `buf.len()` writable bytes.
            let n = unsafe { libc::llistxattr(path.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::ERANGE) {
                    continue;
                }
                return Err(err);
            }
            buf.truncate(n as usize);
            return Ok(buf);
        }
    }

    pub fn remove(path: &CString, name: &CString) -> io::Result<()> {
        // SAFETY: both strings are NUL-terminated.
        let rc = unsafe { libc::lremovexattr(path.as_ptr(), name.as_ptr()) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(NO_ATTR) {
            return Ok(());
        }
        Err(err)
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use std::ffi::CString;
    use std::io;

    fn unsupported<T>() -> io::Result<T> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }

    pub fn get(_: &CString, _: &CString) -> io::Result<Option<Vec<u8>>> {
        unsupported()
    }

    pub fn set(_: &CString, _: &CString, _: &[u8], _: bool) -> io::Result<bool> {
        unsupported()
    }

    pub fn list(_: &CString) -> io::Result<Vec<u8>> {
        unsupported()
    }

    pub fn remove(_: &CString, _: &CString) -> io::Result<()> {
        unsupported()
    }
}

impl AttrStore for XattrStore {
    fn get(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, DocError> {
        c_path(path)
            .and_then(|p| sys::get(&p, &c_name(name)?))
            .map_err(|e| DocError::attr(path, name, e))
    }

    fn set(&self, path: &Path, name: &str, value: &[u8]) -> Result<(), DocError> {
        c_path(path)
            .and_then(|p| sys::set(&p, &c_name(name)?, value, false))
            .map(|_| ())
            .map_err(|e| DocError::attr(path, name, e))
    }

    fn create_exclusive(&self, path: &Path, name: &str, value: &[u8]) -> Result<bool, DocError> {
        c_path(path)
            .and_then(|p| sys::set(&p, &c_name(name)?, value, true))
            .map_err(|e| DocError::attr(path, name, e))
    }

    fn list(&self, path: &Path) -> Result<Vec<String>, DocError> {
        let raw = c_path(path)
            .and_then(|p| sys::list(&p))
            .map_err(|e| DocError::attr(path, "*", e))?;
        Ok(raw
            .split(|b| *b == 0)
            .filter(|name| !name.is_empty())
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect())
    }

    fn remove(&self, path: &Path, name: &str) -> Result<(), DocError> {
        c_path(path)
            .and_then(|p| sys::remove(&p, &c_name(name)?))
            .map_err(|e| DocError::attr(path, name, e))
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::error::is_unsupported;

    /// Skip silently on filesystems (some tmpfs builds) without user xattrs.
    fn supported(dir: &Path) -> bool {
        let marker = dir.join("marker");
        std::fs::write(&marker, "m").unwrap();
        match XattrStore.set(&marker, "user.doc.marker", b"1") {
            Ok(()) => true,
            Err(DocError::Attr { source, .. }) if is_unsupported(&source) => false,
            Err(err) => {
                eprintln!("skipping xattr test: {}", err);
                false
            }
        }
    }

    #[test]
    fn exclusive_create_refuses_existing() {
        let tmp = tempfile::tempdir().unwrap();
        if !supported(tmp.path()) {
            return;
        }
        let file = tmp.path().join("f");
        std::fs::write(&file, "x").unwrap();

        assert!(XattrStore.create_exclusive(&file, "user.doc.conflict.0", b"a").unwrap());
        assert!(!XattrStore.create_exclusive(&file, "user.doc.conflict.0", b"b").unwrap());
        assert_eq!(
            XattrStore.get(&file, "user.doc.conflict.0").unwrap().unwrap(),
            b"a"
        );
        assert!(XattrStore
            .list(&file)
            .unwrap()
            .contains(&"user.doc.conflict.0".to_string()));
    }

    #[test]
    fn missing_attribute_reads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        if !supported(tmp.path()) {
            return;
        }
        let file = tmp.path().join("f");
        std::fs::write(&file, "x").unwrap();
        assert_eq!(XattrStore.get(&file, "user.doc.multihash").unwrap(), None);
        XattrStore.remove(&file, "user.doc.multihash").unwrap();
    }
}
