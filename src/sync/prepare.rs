//! Scan phase: walk source and destination in lock-step and plan actions.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::action::CopyAction;
use crate::attrs::AttrStore;
use crate::error::DocError;
use crate::hash::{commit_file_hash, get_hash, hash_file, Multihash};
use crate::progress::Progress;
use crate::transfer::conflict::{conflict_of, find_conflict_file_name};
use crate::transfer::filter::ScanFilter;

/// What the scan produces, in walk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Action(CopyAction),
    /// A destination-only file, usable as a hard-link source for `hash`.
    Duplicate { hash: Multihash, path: PathBuf },
}

pub trait ScanHandler {
    /// Accept an event. Returning false stops the scan.
    fn event(&mut self, event: ScanEvent) -> bool;

    /// Report a failure. Returning false stops the scan.
    fn error(&mut self, err: DocError) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PrepareOptions {
    /// Compute missing hashes of destination-only files for deduplication.
    pub check_hash: bool,
    /// Copy in both directions.
    pub bidir: bool,
    /// Persist hashes computed while comparing.
    pub commit: bool,
    /// Collect destination-only files as link sources.
    pub dedup: bool,
    /// Force attribute writes on read-only files.
    pub force: bool,
}

/// Running totals shared between the scanning and copying sides.
#[derive(Debug, Default)]
pub struct ScanCounters {
    files: AtomicU64,
    total_bytes: AtomicU64,
    done_bytes: AtomicU64,
}

impl ScanCounters {
    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn done_bytes(&self) -> u64 {
        self.done_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn add_done(&self, bytes: u64) {
        self.done_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

pub struct Preparator<'a, H: ScanHandler> {
    store: &'a dyn AttrStore,
    filter: &'a ScanFilter,
    opts: PrepareOptions,
    counters: &'a ScanCounters,
    progress: &'a dyn Progress,
    handler: H,
}

impl<'a, H: ScanHandler> Preparator<'a, H> {
    pub fn new(
        store: &'a dyn AttrStore,
        filter: &'a ScanFilter,
        opts: PrepareOptions,
        counters: &'a ScanCounters,
        progress: &'a dyn Progress,
        handler: H,
    ) -> Self {
        Self {
            store,
            filter,
            opts,
            counters,
            progress,
            handler,
        }
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Plan everything needed to bring `dst` in line with `src`. Returns false
    /// when the handler stopped the scan.
    pub fn prepare(&mut self, src: &Path, dst: &Path) -> bool {
        self.prepare_copy(src, dst)
    }

    fn emit(&mut self, act: CopyAction) -> bool {
        self.counters
            .total_bytes
            .fetch_add(act.size, Ordering::Relaxed);
        self.handler.event(ScanEvent::Action(act))
    }

    fn prepare_copy(&mut self, src: &Path, dst: &Path) -> bool {
        self.counters.files.fetch_add(1, Ordering::Relaxed);
        let src_meta = fs::symlink_metadata(src);
        let dst_meta = fs::symlink_metadata(dst);

        match (src_meta, dst_meta) {
            (Ok(s), Err(e)) if e.kind() == io::ErrorKind::NotFound => self.copy_missing(src, dst, &s),
            (Err(e), Ok(d)) if e.kind() == io::ErrorKind::NotFound => {
                if self.opts.bidir {
                    self.copy_missing(dst, src, &d)
                } else if self.opts.dedup {
                    self.record_duplicate(src, dst, &d)
                } else {
                    true
                }
            }
            (Ok(s), Ok(d)) => {
                if s.is_dir() && d.is_dir() {
                    self.walk_children(src, dst)
                } else if s.is_dir() || d.is_dir() {
                    self.handler.error(DocError::TypeMismatch {
                        src: src.to_path_buf(),
                        dst: dst.to_path_buf(),
                    })
                } else {
                    self.compare_files(src, dst, &s, &d)
                }
            }
            (Err(e), _) => self.handler.error(DocError::io_at(src, e)),
            (_, Err(e)) => self.handler.error(DocError::io_at(dst, e)),
        }
    }

    /// `from` exists, `to` does not: copy it, and its subtree for directories.
    fn copy_missing(&mut self, from: &Path, to: &Path, meta: &Metadata) -> bool {
        let hash = if meta.is_dir() {
            None
        } else {
            match get_hash(self.store, from, meta, self.opts.dedup) {
                Ok(hash) => hash,
                Err(e) => return self.handler.error(e),
            }
        };
        if !self.emit(CopyAction::new(from, to, hash, meta)) {
            return false;
        }
        if meta.is_dir() {
            return self.walk_children(from, to);
        }
        true
    }

    /// Destination-only entry in dedup mode: remember where its content lives.
    fn record_duplicate(&mut self, src: &Path, dst: &Path, meta: &Metadata) -> bool {
        if meta.is_dir() {
            return self.walk_children(src, dst);
        }
        if !meta.is_file() {
            return true;
        }
        match get_hash(self.store, dst, meta, self.opts.check_hash) {
            Ok(Some(hash)) => self.handler.event(ScanEvent::Duplicate {
                hash,
                path: dst.to_path_buf(),
            }),
            Ok(None) => true,
            Err(e) => self.handler.error(e),
        }
    }

    fn child_names(dir: &Path) -> Result<Vec<OsString>, DocError> {
        match fs::read_dir(dir) {
            Ok(entries) => entries
                .map(|e| e.map(|e| e.file_name()).map_err(|err| DocError::io_at(dir, err)))
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(DocError::io_at(dir, e)),
        }
    }

    /// Recurse over child names: source names always, destination names too
    /// in bidirectional and dedup modes.
    fn walk_children(&mut self, src: &Path, dst: &Path) -> bool {
        let mut names = BTreeSet::new();
        match Self::child_names(src) {
            Ok(list) => names.extend(list),
            Err(e) => return self.handler.error(e),
        }
        if self.opts.bidir || self.opts.dedup {
            match Self::child_names(dst) {
                Ok(list) => names.extend(list),
                Err(e) => return self.handler.error(e),
            }
        }

        for name in names {
            let s = src.join(&name);
            let d = dst.join(&name);
            if self.filter.skips(&s, s.is_dir()) || self.filter.skips(&d, d.is_dir()) {
                tracing::trace!(path = %s.display(), "skipped");
                continue;
            }
            if !self.prepare_copy(&s, &d) {
                return false;
            }
        }
        true
    }

    fn hash_of(&mut self, path: &Path, meta: &Metadata) -> Result<Multihash, DocError> {
        if let Some(hash) = get_hash(self.store, path, meta, false)? {
            return Ok(hash);
        }
        let message = format!("hash {}", path.display());
        self.progress
            .report(self.counters.done_bytes(), self.counters.total_bytes(), &message);
        let hash = hash_file(path)?;
        let message = format!("hashed {}", path.display());
        self.progress
            .report(self.counters.done_bytes(), self.counters.total_bytes(), &message);
        if self.opts.commit && !meta.file_type().is_symlink() {
            if let Err(e) = commit_file_hash(self.store, path, meta, &hash, self.opts.force) {
                tracing::warn!(path = %path.display(), error = %e, "could not record hash");
            }
        }
        Ok(hash)
    }

    fn compare_files(&mut self, src: &Path, dst: &Path, s: &Metadata, d: &Metadata) -> bool {
        let src_hash = match self.hash_of(src, s) {
            Ok(h) => h,
            Err(e) => return self.handler.error(e),
        };
        let dst_hash = match self.hash_of(dst, d) {
            Ok(h) => h,
            Err(e) => return self.handler.error(e),
        };
        if src_hash == dst_hash && s.file_type().is_symlink() == d.file_type().is_symlink() {
            return true;
        }

        // A file and a symlink with equal hashes would mirror onto the
        // reverse copy's name.
        let mirror = self.opts.bidir && src_hash != dst_hash;
        if !self.conflict_copy(src, dst, src_hash, s, d, mirror) {
            return false;
        }
        if self.opts.bidir {
            return self.conflict_copy(dst, src, dst_hash, d, s, mirror);
        }
        true
    }

    /// Plan a conflict copy of `from` beside `existing`, unless `from` is
    /// itself a conflict copy or the same content is already stored there.
    ///
    /// With `mirror` the copy is also planned into the tree of `from` under
    /// the same name, so both trees hold every conflict copy.
    fn conflict_copy(
        &mut self,
        from: &Path,
        existing: &Path,
        hash: Multihash,
        from_meta: &Metadata,
        existing_meta: &Metadata,
        mirror: bool,
    ) -> bool {
        match conflict_of(self.store, from) {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(e) => return self.handler.error(e),
        }
        let name = match find_conflict_file_name(self.store, existing, &hash) {
            Ok(Some(name)) => name,
            Ok(None) => return true,
            Err(e) => return self.handler.error(e),
        };
        let mirror_path = name
            .file_name()
            .filter(|_| mirror)
            .map(|n| from.with_file_name(n));
        if !self.emit(CopyAction::conflict(
            from,
            name,
            hash.clone(),
            from_meta,
            existing,
            existing_meta,
        )) {
            return false;
        }
        match mirror_path {
            Some(path) => self.mirror_conflict(from, path, hash, from_meta),
            None => true,
        }
    }

    fn mirror_conflict(
        &mut self,
        from: &Path,
        mirror: PathBuf,
        hash: Multihash,
        from_meta: &Metadata,
    ) -> bool {
        match fs::symlink_metadata(&mirror) {
            // Whatever is there is compared on the next run.
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.emit(CopyAction::conflict(
                from, mirror, hash, from_meta, from, from_meta,
            )),
            Err(e) => self.handler.error(DocError::io_at(&mirror, e)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::attrs::DirStore;
    use crate::hash::hash_bytes;
    use crate::progress::NoProgress;

    /// Collects everything; stops on errors when `stop_on_error` is set.
    #[derive(Default)]
    pub(crate) struct Collect {
        pub events: Vec<ScanEvent>,
        pub errors: Vec<DocError>,
        pub stop_on_error: bool,
    }

    impl ScanHandler for Collect {
        fn event(&mut self, event: ScanEvent) -> bool {
            self.events.push(event);
            true
        }

        fn error(&mut self, err: DocError) -> bool {
            self.errors.push(err);
            !self.stop_on_error
        }
    }

    pub(crate) struct Trees {
        pub tmp: tempfile::TempDir,
        pub store: DirStore,
        pub src: PathBuf,
        pub dst: PathBuf,
    }

    pub(crate) fn trees() -> Trees {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirStore::new(tmp.path().join(".dirstore"));
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        Trees { tmp, store, src, dst }
    }

    pub(crate) fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn scan(t: &Trees, opts: PrepareOptions) -> Collect {
        let filter = ScanFilter::standard();
        let counters = ScanCounters::default();
        let mut prep = Preparator::new(&t.store, &filter, opts, &counters, &NoProgress, Collect::default());
        assert!(prep.prepare(&t.src, &t.dst));
        prep.into_handler()
    }

    fn actions(c: &Collect) -> Vec<&CopyAction> {
        c.events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Action(a) => Some(a),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn directories_come_before_their_children() {
        let t = trees();
        write(&t.src.join("d/e/f.txt"), "f");
        write(&t.src.join("top.txt"), "t");

        let c = scan(&t, PrepareOptions::default());
        let dsts: Vec<_> = actions(&c)
            .iter()
            .map(|a| a.dst.strip_prefix(&t.dst).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            dsts,
            vec![
                PathBuf::from("d"),
                PathBuf::from("d/e"),
                PathBuf::from("d/e/f.txt"),
                PathBuf::from("top.txt"),
            ]
        );
        assert!(actions(&c)[0].is_dir());
    }

    #[test]
    fn identical_files_need_nothing() {
        let t = trees();
        write(&t.src.join("a.txt"), "same");
        write(&t.dst.join("a.txt"), "same");

        let c = scan(&t, PrepareOptions::default());
        assert!(c.events.is_empty());
        assert!(c.errors.is_empty());
    }

    #[test]
    fn differing_files_plan_a_conflict_copy() {
        let t = trees();
        write(&t.src.join("a.txt"), "v1");
        write(&t.dst.join("a.txt"), "v2");

        let c = scan(&t, PrepareOptions::default());
        let acts = actions(&c);
        assert_eq!(acts.len(), 1);
        let act = acts[0];
        assert!(act.conflict);
        assert_eq!(act.original_dst.as_deref(), Some(t.dst.join("a.txt").as_path()));
        assert_eq!(act.dst, t.dst.join(format!("a.txt.{}.txt", hash_bytes(b"v1"))));
    }

    #[test]
    fn bidirectional_conflicts_go_both_ways() {
        let t = trees();
        write(&t.src.join("a.txt"), "v1");
        write(&t.dst.join("a.txt"), "v2");
        write(&t.dst.join("only-dst.txt"), "d");

        let opts = PrepareOptions {
            bidir: true,
            ..Default::default()
        };
        let c = scan(&t, opts);
        let acts = actions(&c);
        let v1_name = format!("a.txt.{}.txt", hash_bytes(b"v1"));
        let v2_name = format!("a.txt.{}.txt", hash_bytes(b"v2"));
        let planned: Vec<_> = acts.iter().map(|a| (a.src.clone(), a.dst.clone())).collect();
        assert_eq!(
            planned,
            vec![
                (t.src.join("a.txt"), t.dst.join(&v1_name)),
                (t.src.join("a.txt"), t.src.join(&v1_name)),
                (t.dst.join("a.txt"), t.src.join(&v2_name)),
                (t.dst.join("a.txt"), t.dst.join(&v2_name)),
                (t.dst.join("only-dst.txt"), t.src.join("only-dst.txt")),
            ]
        );
        assert!(acts[..4].iter().all(|a| a.conflict));
    }

    #[test]
    fn conflict_tagged_source_is_not_copied_again() {
        let t = trees();
        write(&t.src.join("a.txt"), "v1");
        write(&t.dst.join("a.txt"), "v2");
        crate::transfer::conflict::mark_conflict_for(&t.store, &t.src.join("a.txt"), "x").unwrap();

        let c = scan(&t, PrepareOptions::default());
        assert!(c.events.is_empty());
    }

    #[test]
    fn dedup_records_destination_only_files() {
        let t = trees();
        write(&t.src.join("new.txt"), "payload");
        write(&t.dst.join("old/moved.txt"), "payload");

        let opts = PrepareOptions {
            dedup: true,
            check_hash: true,
            ..Default::default()
        };
        let c = scan(&t, opts);
        assert!(c.events.contains(&ScanEvent::Duplicate {
            hash: hash_bytes(b"payload"),
            path: t.dst.join("old/moved.txt"),
        }));
        let acts = actions(&c);
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].hash, Some(hash_bytes(b"payload")));
    }

    #[test]
    fn commit_on_scan_persists_computed_hashes() {
        let t = trees();
        write(&t.src.join("a.txt"), "v1");
        write(&t.dst.join("a.txt"), "v1");

        let opts = PrepareOptions {
            commit: true,
            ..Default::default()
        };
        scan(&t, opts);
        let meta = fs::symlink_metadata(t.src.join("a.txt")).unwrap();
        assert_eq!(
            get_hash(&t.store, &t.src.join("a.txt"), &meta, false).unwrap(),
            Some(hash_bytes(b"v1"))
        );
    }

    #[test]
    fn bookkeeping_and_ignored_directories_are_skipped() {
        let t = trees();
        write(&t.src.join(".doccommit"), "");
        write(&t.src.join("cache/.docignore"), "");
        write(&t.src.join("cache/big.bin"), "x");
        write(&t.src.join("keep.txt"), "k");

        let c = scan(&t, PrepareOptions::default());
        let acts = actions(&c);
        assert_eq!(acts.len(), 1);
        assert_eq!(acts[0].dst, t.dst.join("keep.txt"));
    }

    #[derive(Default)]
    struct Recorded(std::sync::Mutex<Vec<String>>);

    impl Progress for Recorded {
        fn report(&self, _current: u64, _total: u64, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    #[test]
    fn progress_is_reported_around_hashing() {
        let t = trees();
        write(&t.src.join("a.txt"), "v1");
        write(&t.dst.join("a.txt"), "v1");

        let filter = ScanFilter::standard();
        let counters = ScanCounters::default();
        let progress = Recorded::default();
        let mut prep = Preparator::new(
            &t.store,
            &filter,
            PrepareOptions::default(),
            &counters,
            &progress,
            Collect::default(),
        );
        assert!(prep.prepare(&t.src, &t.dst));

        let messages = progress.0.lock().unwrap().clone();
        let src = t.src.join("a.txt").display().to_string();
        assert_eq!(messages[..2], [format!("hash {}", src), format!("hashed {}", src)]);
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let t = trees();
        write(&t.src.join("x"), "file");
        fs::create_dir(t.dst.join("x")).unwrap();

        let c = scan(&t, PrepareOptions::default());
        assert_eq!(c.errors.len(), 1);
        assert!(matches!(c.errors[0], DocError::TypeMismatch { .. }));
    }
}
