//! Content hashes in multihash form.
//!
//! A hash is stored as `[code, length, digest...]`. Only SHA-1 (code `0x11`,
//! 20-byte digest) is produced; any well-formed envelope is accepted when read.
//! The text form is base58 (Bitcoin alphabet).

pub mod cache;
pub mod checksum;

use std::fmt;
use std::str::FromStr;

use crate::error::DocError;

pub use cache::{
    cached_hash, commit_file_hash, format_hash_time, get_hash, hash_time, mtime_of, recorded_hash,
};
pub use checksum::{hash_bytes, hash_file};

pub const SHA1_CODE: u8 = 0x11;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Multihash(Vec<u8>);

impl Multihash {
    pub fn from_sha1(digest: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(digest.len() + 2);
        bytes.push(SHA1_CODE);
        bytes.push(digest.len() as u8);
        bytes.extend_from_slice(digest);
        Multihash(bytes)
    }

    /// Validate and wrap an encoded envelope.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DocError> {
        match bytes.as_slice() {
            [_, len, digest @ ..] if *len as usize == digest.len() && !digest.is_empty() => {
                Ok(Multihash(bytes))
            }
            _ => Err(DocError::InvalidHash(format!(
                "malformed multihash envelope ({} bytes)",
                bytes.len()
            ))),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl FromStr for Multihash {
    type Err = DocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| DocError::InvalidHash(format!("{}: {}", s, e)))?;
        Multihash::from_bytes(bytes)
    }
}

impl fmt::Display for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multihash({})", self.to_base58())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_envelope_layout() {
        let h = hash_bytes(b"");
        assert_eq!(h.as_bytes().len(), 22);
        assert_eq!(h.as_bytes()[0], SHA1_CODE);
        assert_eq!(h.as_bytes()[1], 20);
        // SHA-1 of the empty string.
        assert_eq!(h.as_bytes()[2..6], [0xda, 0x39, 0xa3, 0xee]);
    }

    #[test]
    fn base58_text_form_parses_back() {
        let h = hash_bytes(b"hello");
        let text = h.to_string();
        assert!(text.starts_with('5'), "sha1 multihashes start with 5: {}", text);
        assert_eq!(text.parse::<Multihash>().unwrap(), h);
    }

    #[test]
    fn rejects_malformed_envelopes() {
        assert!(Multihash::from_bytes(vec![0x11]).is_err());
        assert!(Multihash::from_bytes(vec![0x11, 3, 1, 2]).is_err());
        assert!("0OIl".parse::<Multihash>().is_err());
    }
}
