//! `.docattr` files: free-form key/value attributes attached to paths.
//!
//! ```text
//! /                  the directory holding the file, and everything below
//!     backup=weekly
//! /photos/           a subdirectory
//!     backup=never
//! /notes.txt         a single file
//!     owner=alice
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::entry::CommitEntry;
use super::log::LogLocation;
use crate::error::DocError;

pub const DOCATTR: &str = ".docattr";

pub type AttrMap = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocAttrItem {
    /// Name relative to the directory of the `.docattr` file; empty or ending
    /// with `/` for directories.
    pub name: String,
    pub values: BTreeMap<String, String>,
}

pub fn parse_docattr(reader: impl BufRead, file: &Path) -> Result<Vec<DocAttrItem>, DocError> {
    let mut items: Vec<DocAttrItem> = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| DocError::io_at(file, e))?;
        let parse_err = |reason: &str| DocError::LogParse {
            path: file.to_path_buf(),
            line: idx + 1,
            reason: reason.to_string(),
        };
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('/') {
            items.push(DocAttrItem {
                name: name.trim_end().to_string(),
                values: BTreeMap::new(),
            });
            continue;
        }
        if !line.starts_with([' ', '\t']) {
            return Err(parse_err("expected '/name' or an indented key=value"));
        }
        let Some((key, value)) = line.trim().split_once('=') else {
            return Err(parse_err("expected key=value"));
        };
        let Some(item) = items.last_mut() else {
            return Err(parse_err("key=value before any /name line"));
        };
        item.values
            .insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(items)
}

/// Collect the attributes of every `.docattr` recorded in the log and key
/// them relative to `loc.prefix`. Deeper files override shallower ones.
pub fn read_attrs(loc: &LogLocation, all: &[CommitEntry]) -> Result<AttrMap, DocError> {
    let mut files: Vec<&str> = all
        .iter()
        .map(|e| e.path.as_str())
        .filter(|p| *p == DOCATTR || p.ends_with(&format!("/{}", DOCATTR)))
        .collect();
    files.sort_by_key(|p| p.matches('/').count());
    files.dedup();

    let mut full: Vec<(String, BTreeMap<String, String>)> = Vec::new();
    for rel in files {
        let path = loc.root.join(rel);
        let reader = match File::open(&path) {
            Ok(f) => BufReader::new(f),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "recorded .docattr is gone");
                continue;
            }
            Err(e) => return Err(DocError::io_at(&path, e)),
        };
        let dir = &rel[..rel.len() - DOCATTR.len()];
        for item in parse_docattr(reader, &path)? {
            let key = format!("{}{}", dir, item.name);
            let key = if key.is_empty() { "/".to_string() } else { key };
            full.push((key, item.values));
        }
    }
    full.sort_by_key(|(key, _)| if key == "/" { 0 } else { key.len() });

    let mut scoped = AttrMap::new();
    for (key, values) in full {
        let Some(target) = scope_key(&key, &loc.prefix) else {
            continue;
        };
        scoped.entry(target).or_default().extend(values);
    }
    Ok(scoped)
}

fn scope_key(key: &str, prefix: &str) -> Option<String> {
    if key == "/" {
        return Some("/".to_string());
    }
    if let Some(rest) = key.strip_prefix(prefix) {
        return Some(if rest.is_empty() { "/".to_string() } else { rest.to_string() });
    }
    if key.ends_with('/') && prefix.starts_with(key) {
        return Some("/".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    #[test]
    fn parses_items_and_values() {
        let text = "# comment\n/\n  backup=weekly\n/photos/\n\tbackup = never\n\tsize=big\n";
        let items = parse_docattr(Cursor::new(text), Path::new(".docattr")).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "");
        assert_eq!(items[0].values["backup"], "weekly");
        assert_eq!(items[1].name, "photos/");
        assert_eq!(items[1].values["backup"], "never");
        assert_eq!(items[1].values["size"], "big");
    }

    #[test]
    fn rejects_values_without_an_item() {
        assert!(parse_docattr(Cursor::new("  a=b\n"), Path::new("x")).is_err());
        assert!(parse_docattr(Cursor::new("/x\nnot indented\n"), Path::new("x")).is_err());
    }

    #[test]
    fn nested_files_are_scoped_to_the_reader() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("docs")).unwrap();
        std::fs::write(tmp.path().join(DOCATTR), "/\n  backup=yes\n/docs/\n  backup=no\n").unwrap();
        std::fs::write(
            tmp.path().join("docs").join(DOCATTR),
            "/keep.txt\n  backup=always\n",
        )
        .unwrap();
        let all = vec![
            CommitEntry::dir("docs"),
            CommitEntry::file("docs/.docattr", crate::hash::hash_bytes(b"1")),
            CommitEntry::file(".docattr", crate::hash::hash_bytes(b"2")),
        ];

        let root = LogLocation {
            file: tmp.path().join(".doccommit"),
            root: PathBuf::from(tmp.path()),
            prefix: String::new(),
        };
        let attrs = read_attrs(&root, &all).unwrap();
        assert_eq!(attrs["/"]["backup"], "yes");
        assert_eq!(attrs["docs/"]["backup"], "no");
        assert_eq!(attrs["docs/keep.txt"]["backup"], "always");

        let docs = LogLocation {
            prefix: "docs/".to_string(),
            ..root
        };
        let attrs = read_attrs(&docs, &all).unwrap();
        assert_eq!(attrs["/"]["backup"], "no");
        assert_eq!(attrs["keep.txt"]["backup"], "always");
    }
}
