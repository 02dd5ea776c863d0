//! Apply phase: run planned actions one at a time, in order.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::action::{CopyAction, EntryKind};
use super::prepare::{ScanCounters, ScanEvent};
use crate::attrs::AttrStore;
use crate::commit::log::AppendWriter;
use crate::commit::{find_log, open_dir_append, CommitEntry, FileIdentity, IntegrityPolicy};
use crate::error::DocError;
use crate::hash::{get_hash, Multihash};
use crate::progress::Progress;

/// Destination-only files by content hash.
pub type DedupIndex = HashMap<Multihash, Vec<PathBuf>>;

#[derive(Debug, Default)]
pub struct ExecOutcome {
    /// Actions applied, or that would have been applied in a dry run.
    pub performed: Vec<CopyAction>,
    pub conflicts: Vec<PathBuf>,
    /// Destination-only files whose content was linked into place.
    pub duplicates: Vec<PathBuf>,
    pub bytes: u64,
    pub errors: Vec<DocError>,
    pub warnings: Vec<DocError>,
    /// Execution ended early because of an error.
    pub stopped: bool,
}

pub struct Executor<'a> {
    store: &'a dyn AttrStore,
    dry_run: bool,
    force: bool,
    counters: &'a ScanCounters,
    progress: &'a dyn Progress,
    dedup: Option<DedupIndex>,
    recorder: Option<CommitRecorder<'a>>,
}

impl<'a> Executor<'a> {
    pub fn new(
        store: &'a dyn AttrStore,
        counters: &'a ScanCounters,
        progress: &'a dyn Progress,
    ) -> Self {
        Self {
            store,
            dry_run: false,
            force: false,
            counters,
            progress,
            dedup: None,
            recorder: None,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Keep going after a failed action.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Replace copies with hard links to identical destination-only files.
    pub fn dedup(mut self, index: DedupIndex) -> Self {
        self.dedup = Some(index);
        self
    }

    pub fn record_commits(mut self, recorder: CommitRecorder<'a>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Consume events until they run out, an action fails without `force`, or
    /// `cancel` is raised by the scanning side.
    pub fn execute(
        &mut self,
        events: impl IntoIterator<Item = ScanEvent>,
        cancel: &AtomicBool,
    ) -> ExecOutcome {
        let mut outcome = ExecOutcome::default();
        let mut linked: BTreeSet<Multihash> = BTreeSet::new();

        for event in events {
            if cancel.load(Ordering::Relaxed) {
                outcome.stopped = true;
                break;
            }
            match event {
                ScanEvent::Duplicate { hash, path } => {
                    if let Some(index) = self.dedup.as_mut() {
                        index.entry(hash).or_default().push(path);
                    }
                }
                ScanEvent::Action(act) => {
                    if !self.dispatch(act, &mut outcome, &mut linked) {
                        outcome.stopped = true;
                        cancel.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }

        if let Some(recorder) = self.recorder.take() {
            outcome.errors.extend(recorder.finish());
        }
        if let Some(index) = &self.dedup {
            outcome.duplicates = linked
                .iter()
                .filter_map(|hash| index.get(hash))
                .flatten()
                .cloned()
                .collect();
        }
        outcome
    }

    fn dispatch(
        &mut self,
        mut act: CopyAction,
        outcome: &mut ExecOutcome,
        linked: &mut BTreeSet<Multihash>,
    ) -> bool {
        if act.src_kind == EntryKind::File && !act.link {
            let source = act
                .hash
                .as_ref()
                .and_then(|hash| self.dedup.as_ref()?.get(hash)?.first());
            if let Some(source) = source {
                act.src = source.clone();
                act.link = true;
            }
        }

        let message = act.to_string();
        self.progress.report(
            self.counters.done_bytes(),
            self.counters.total_bytes(),
            message.trim(),
        );

        if !self.dry_run {
            match act.run(self.store) {
                Ok(result) => {
                    outcome.bytes += result.bytes;
                    outcome.warnings.extend(result.warnings);
                }
                Err(e) => {
                    tracing::debug!(action = %message.trim(), error = %e, "action failed");
                    outcome.errors.push(e);
                    return self.force;
                }
            }
            if let Some(recorder) = self.recorder.as_mut() {
                if let Err(e) = recorder.record(self.store, &act) {
                    outcome.warnings.push(e);
                }
            }
        }

        self.counters.add_done(act.size);
        self.progress.report(
            self.counters.done_bytes(),
            self.counters.total_bytes(),
            message.trim(),
        );
        if act.link {
            if let Some(hash) = &act.hash {
                linked.insert(hash.clone());
            }
        }
        if act.conflict {
            outcome.conflicts.push(act.dst.clone());
        }
        outcome.performed.push(act);
        true
    }
}

/// Appends every applied action to the commit log of the tree it landed in.
pub struct CommitRecorder<'a> {
    trees: Vec<(PathBuf, AppendWriter<'a>)>,
}

impl<'a> CommitRecorder<'a> {
    /// Open the logs governing `roots`. Trees without a log are not recorded;
    /// a log that fails its integrity check is skipped with a warning.
    pub fn open(store: &'a dyn AttrStore, policy: IntegrityPolicy, roots: &[&Path]) -> Self {
        let mut trees = Vec::new();
        let mut logs = Vec::new();
        for root in roots {
            if !root.is_dir() {
                continue;
            }
            match find_log(root) {
                Ok(Some(loc)) if logs.contains(&loc.file) => {
                    tracing::debug!(root = %root.display(), "log already open for another root");
                    continue;
                }
                Ok(Some(loc)) => logs.push(loc.file),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "cannot locate commit log");
                    continue;
                }
            }
            match open_dir_append(store, root, policy) {
                Ok(writer) => trees.push((root.to_path_buf(), writer)),
                Err(e) => {
                    tracing::warn!(root = %root.display(), error = %e, "not recording commits")
                }
            }
        }
        Self { trees }
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    fn record(&mut self, store: &dyn AttrStore, act: &CopyAction) -> Result<(), DocError> {
        if act.src_kind == EntryKind::Symlink {
            return Ok(());
        }
        for (root, writer) in &mut self.trees {
            let Ok(rel) = act.dst.strip_prefix(root.as_path()) else {
                continue;
            };
            let rel = rel.to_str().ok_or_else(|| DocError::NonUtf8Path {
                path: act.dst.clone(),
            })?;
            let meta = std::fs::symlink_metadata(&act.dst)
                .map_err(|e| DocError::io_at(&act.dst, e))?;
            let identity = FileIdentity::from_metadata(&meta);
            let entry = if act.is_dir() {
                CommitEntry::dir(rel)
            } else {
                let hash = match &act.hash {
                    Some(hash) => hash.clone(),
                    None => get_hash(store, &act.dst, &meta, true)?.ok_or_else(|| {
                        DocError::InvalidHash(format!("no hash for {}", act.dst.display()))
                    })?,
                };
                CommitEntry::file(rel, hash)
            };
            return writer.append(&entry.with_identity(identity));
        }
        Ok(())
    }

    fn finish(self) -> Vec<DocError> {
        self.trees
            .into_iter()
            .filter_map(|(_, writer)| writer.finish().err())
            .collect()
    }
}
