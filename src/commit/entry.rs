use std::fmt;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;
use std::str::FromStr;

use crate::error::DocError;
use crate::hash::Multihash;

/// Stable identity of a tracked entry, independent of its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileIdentity {
    Uuid(String),
    DevInode { dev: u64, ino: u64 },
}

impl FileIdentity {
    pub fn from_metadata(meta: &Metadata) -> Self {
        FileIdentity::DevInode {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileIdentity::Uuid(uuid) => f.write_str(uuid),
            FileIdentity::DevInode { dev, ino } => write!(f, "{}:{}", dev, ino),
        }
    }
}

/// Parses the `dev:ino` form.
impl FromStr for FileIdentity {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s
            .split_once(':')
            .and_then(|(dev, ino)| Some((dev.parse().ok()?, ino.parse().ok()?)));
        match parsed {
            Some((dev, ino)) => Ok(FileIdentity::DevInode { dev, ino }),
            None => Err(DocError::Config(format!("invalid device:inode '{}'", s))),
        }
    }
}

/// One tracked file or directory. Directory paths end with `/` and carry no hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub path: String,
    pub hash: Option<Multihash>,
    pub identity: Option<FileIdentity>,
}

impl CommitEntry {
    pub fn file(path: impl Into<String>, hash: Multihash) -> Self {
        Self {
            path: path.into(),
            hash: Some(hash),
            identity: None,
        }
    }

    pub fn dir(path: impl Into<String>) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Self {
            path,
            hash: None,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: FileIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Base58 hash, or the empty string for entries without one.
    pub fn hash_text(&self) -> String {
        self.hash.as_ref().map(|h| h.to_base58()).unwrap_or_default()
    }
}
