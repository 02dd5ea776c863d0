use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocError {
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    IoAt {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot access attribute {name} on {}: {source}", path.display())]
    Attr {
        path: PathBuf,
        name: String,
        source: std::io::Error,
    },

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Destination is inside source directory: {} -> {}", src.display(), dst.display())]
    DestinationIsSubdirectory { src: PathBuf, dst: PathBuf },

    #[error("{}: type differs from {}", src.display(), dst.display())]
    TypeMismatch { src: PathBuf, dst: PathBuf },

    #[error("Path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("{}:{line}: {reason}", path.display())]
    LogParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{}: commit log was manually modified (expected {expected}, found {actual})", path.display())]
    LogModified {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("{}: commit log carries no integrity tag", path.display())]
    LogUntagged { path: PathBuf },

    #[error("Invalid arguments: {0}")]
    Usage(String),
}

impl DocError {
    /// Returns a user-friendly suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            DocError::SourceNotFound { .. } => {
                Some("Check the path exists and spelling is correct.")
            }
            DocError::PermissionDenied { .. } => {
                Some("Check file permissions, or retry with -f to write attributes on read-only files.")
            }
            DocError::InvalidPattern { .. } => {
                Some("Check glob syntax. Examples: '*.log', '**/*.tmp', 'build/'")
            }
            DocError::DestinationIsSubdirectory { .. } => {
                Some("Choose a destination outside the source directory.")
            }
            DocError::Attr { source, .. } if is_unsupported(source) => {
                Some("This filesystem has no extended attributes. Run 'doctrack init' in the tree root to create a .dirstore.")
            }
            DocError::LogModified { .. } | DocError::LogUntagged { .. } => {
                Some("Review the .doccommit file, then run 'doctrack commit --force' to accept it.")
            }
            DocError::Usage(_) => Some("See 'doctrack help' for the accepted arguments."),
            _ => None,
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => DocError::PermissionDenied { path },
            _ => DocError::IoAt { path, source },
        }
    }

    pub fn attr(path: impl Into<PathBuf>, name: &str, source: std::io::Error) -> Self {
        DocError::Attr {
            path: path.into(),
            name: name.to_string(),
            source,
        }
    }

    /// True when the failure was the OS refusing a write for lack of permission.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            DocError::PermissionDenied { .. } => true,
            DocError::Io { source } | DocError::IoAt { source, .. } | DocError::Attr { source, .. } => {
                matches!(source.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM))
                    || source.kind() == std::io::ErrorKind::PermissionDenied
            }
            _ => false,
        }
    }
}

/// True when the filesystem does not implement extended attributes.
pub fn is_unsupported(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EOPNOTSUPP) || err.kind() == std::io::ErrorKind::Unsupported
}

impl From<globset::Error> for DocError {
    fn from(err: globset::Error) -> Self {
        DocError::InvalidPattern {
            pattern: err.glob().map(|g| g.to_string()).unwrap_or_default(),
            reason: err.kind().to_string(),
        }
    }
}

impl From<walkdir::Error> for DocError {
    fn from(err: walkdir::Error) -> Self {
        if let Some(path) = err.path() {
            let path = path.to_path_buf();
            if let Some(inner) = err.io_error() {
                if inner.kind() == std::io::ErrorKind::PermissionDenied {
                    return DocError::PermissionDenied { path };
                }
            }
            let source = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
            return DocError::IoAt { path, source };
        }
        DocError::Io {
            source: err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walkdir error")),
        }
    }
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        DocError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for DocError {
    fn from(err: toml::de::Error) -> Self {
        DocError::Config(format!("Invalid config.toml: {}", err))
    }
}

impl From<std::path::StripPrefixError> for DocError {
    fn from(err: std::path::StripPrefixError) -> Self {
        DocError::Io {
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn source_not_found_display_and_suggestion() {
        let err = DocError::SourceNotFound {
            path: PathBuf::from("/tmp/missing"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Source not found"));
        assert!(msg.contains("missing"));
        assert_eq!(
            err.suggestion(),
            Some("Check the path exists and spelling is correct.")
        );
    }

    #[test]
    fn io_at_maps_permission_denied() {
        let err = DocError::io_at(
            "/ro/file",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, DocError::PermissionDenied { .. }));
        assert!(err.is_permission_denied());
    }

    #[test]
    fn attr_error_recognizes_eacces() {
        let err = DocError::attr(
            "/ro/file",
            "user.doc.multihash",
            std::io::Error::from_raw_os_error(libc::EACCES),
        );
        assert!(err.is_permission_denied());
        assert!(format!("{}", err).contains("user.doc.multihash"));
    }

    #[test]
    fn unsupported_attr_error_hints_at_init() {
        let err = DocError::attr(
            "/mnt/file",
            "user.doc.multihash",
            std::io::Error::from_raw_os_error(libc::EOPNOTSUPP),
        );
        assert!(err.suggestion().unwrap().contains("doctrack init"));
        assert!(!err.is_permission_denied());
    }

    #[test]
    fn modified_log_suggests_forced_commit() {
        let err = DocError::LogModified {
            path: PathBuf::from("/t/.doccommit"),
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(format!("{}", err).contains("manually modified"));
        assert!(err.suggestion().unwrap().contains("--force"));
    }

    #[test]
    fn io_error_no_suggestion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file gone");
        let err: DocError = io_err.into();
        assert!(err.suggestion().is_none());
    }

    #[test]
    fn from_strip_prefix_error() {
        let path = PathBuf::from("/a/b");
        let result = path.strip_prefix("/c/d");
        let err: DocError = result.unwrap_err().into();
        match err {
            DocError::Io { .. } => {}
            other => panic!("Expected Io variant, got: {:?}", other),
        }
    }
}
