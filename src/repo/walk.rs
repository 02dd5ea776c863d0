use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::error::DocError;
use crate::transfer::filter::ScanFilter;

/// Depth-first walk of `root` in file-name order, symlinks not followed and
/// entries rejected by `filter` pruned.
pub fn walk<'a>(
    root: &Path,
    filter: &'a ScanFilter,
) -> impl Iterator<Item = Result<DirEntry, DocError>> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| filter.keeps(entry))
        .map(|entry| entry.map_err(DocError::from))
}

/// Regular files only.
pub fn files<'a>(
    root: &Path,
    filter: &'a ScanFilter,
) -> impl Iterator<Item = Result<DirEntry, DocError>> + 'a {
    walk(root, filter).filter(|entry| match entry {
        Ok(entry) => entry.file_type().is_file(),
        Err(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn prunes_bookkeeping_and_ignored_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".dirstore/7.inode")).unwrap();
        fs::create_dir_all(root.join("skip")).unwrap();
        fs::create_dir_all(root.join("keep")).unwrap();
        fs::write(root.join("skip/.docignore"), "").unwrap();
        fs::write(root.join("skip/a"), "a").unwrap();
        fs::write(root.join("keep/b"), "b").unwrap();
        fs::write(root.join(".doccommit"), "").unwrap();

        let filter = ScanFilter::standard();
        let found: Vec<_> = files(root, &filter)
            .map(|e| e.unwrap().path().strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(found, vec![Path::new("keep/b").to_path_buf()]);
    }
}
