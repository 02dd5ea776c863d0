//! Compare the committed state of two trees.

use std::collections::BTreeSet;
use std::fmt;

use crate::commit::format::encode_path;
use crate::commit::{Commit, CommitEntry};

/// `-` for the source side, `+` for the destination side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub sign: char,
    pub hash: String,
    pub path: String,
}

impl DiffLine {
    fn src(entry: &CommitEntry) -> Self {
        Self {
            sign: '-',
            hash: entry.hash_text(),
            path: entry.path.clone(),
        }
    }

    fn dst(entry: &CommitEntry) -> Self {
        Self {
            sign: '+',
            hash: entry.hash_text(),
            path: entry.path.clone(),
        }
    }
}

impl fmt::Display for DiffLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}\t{}", self.sign, self.hash, encode_path(&self.path))
    }
}

/// Every path that differs between the two commits, in path order. A path
/// present on both sides with different hashes gives a `-` line then a `+`
/// line.
pub fn diff(src: &Commit, dst: &Commit) -> Vec<DiffLine> {
    let paths: BTreeSet<&str> = src
        .entries()
        .chain(dst.entries())
        .map(|e| e.path.as_str())
        .collect();

    let mut lines = Vec::new();
    for path in paths {
        match (src.by_path(path), dst.by_path(path)) {
            (Some(s), None) => lines.push(DiffLine::src(s)),
            (None, Some(d)) => lines.push(DiffLine::dst(d)),
            (Some(s), Some(d)) if s.hash != d.hash => {
                lines.push(DiffLine::src(s));
                lines.push(DiffLine::dst(d));
            }
            _ => {}
        }
    }
    lines
}

/// Source entries the destination lacks or holds with other content, in
/// source log order.
pub fn missing(src: &Commit, dst: &Commit) -> Vec<DiffLine> {
    let mut lines = Vec::new();
    for s in src.entries() {
        match dst.by_path(&s.path) {
            None => lines.push(DiffLine::src(s)),
            Some(d) if d.hash != s.hash => {
                lines.push(DiffLine::src(s));
                lines.push(DiffLine::dst(d));
            }
            Some(_) => {}
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn commits() -> (Commit, Commit) {
        let src = Commit::from_entries(vec![
            CommitEntry::file("z.txt", hash_bytes(b"z")),
            CommitEntry::file("same.txt", hash_bytes(b"s")),
            CommitEntry::file("changed.txt", hash_bytes(b"1")),
        ]);
        let dst = Commit::from_entries(vec![
            CommitEntry::file("same.txt", hash_bytes(b"s")),
            CommitEntry::file("changed.txt", hash_bytes(b"2")),
            CommitEntry::file("extra\tname", hash_bytes(b"e")),
        ]);
        (src, dst)
    }

    #[test]
    fn diff_lists_both_sides_in_path_order() {
        let (src, dst) = commits();
        let lines: Vec<_> = diff(&src, &dst).iter().map(|l| (l.sign, l.path.clone())).collect();
        assert_eq!(
            lines,
            vec![
                ('-', "changed.txt".to_string()),
                ('+', "changed.txt".to_string()),
                ('+', "extra\tname".to_string()),
                ('-', "z.txt".to_string()),
            ]
        );
    }

    #[test]
    fn missing_follows_source_order_and_escapes_paths() {
        let (src, dst) = commits();
        let lines = missing(&src, &dst);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].to_string(), format!("- {}\tz.txt", hash_bytes(b"z")));
        assert_eq!(lines[1].path, "changed.txt");

        let reverse = missing(&dst, &src);
        assert_eq!(reverse.last().unwrap().to_string(), format!("- {}\textra\\tname", hash_bytes(b"e")));
    }
}
