//! Wires scanning and applying together.
//!
//! In streaming mode the scan runs on a worker thread and hands actions over a
//! bounded channel, so copying starts while the walk is still going. In
//! two-pass mode the whole plan is collected first, which gives exact totals
//! before anything is touched.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::thread;

use super::executor::{CommitRecorder, DedupIndex, ExecOutcome, Executor};
use super::prepare::{PrepareOptions, Preparator, ScanCounters, ScanEvent, ScanHandler};
use super::report::SyncReport;
use crate::attrs::AttrStore;
use crate::commit::IntegrityPolicy;
use crate::error::DocError;
use crate::progress::Progress;
use crate::transfer::filter::ScanFilter;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Keep going after errors.
    pub force: bool,
    /// Copy in both directions.
    pub bidir: bool,
    /// Hard-link to identical destination-only files instead of copying.
    pub dedup: bool,
    /// Remove destination-only files whose content was linked into place.
    pub delete_duplicates: bool,
    /// Hash destination-only files that have no valid cached hash.
    pub check_hash: bool,
    /// Record hashes computed while comparing.
    pub commit: bool,
    pub two_pass: bool,
    pub queue_capacity: usize,
    /// Append applied actions to the destination's commit log.
    pub record_commits: bool,
    pub integrity: IntegrityPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            force: false,
            bidir: false,
            dedup: false,
            delete_duplicates: false,
            check_hash: false,
            commit: false,
            two_pass: false,
            queue_capacity: 100,
            record_commits: true,
            integrity: IntegrityPolicy::Strict,
        }
    }
}

impl SyncOptions {
    fn stop_on_error(&self) -> bool {
        !self.force && !self.dry_run
    }

    fn prepare_options(&self) -> PrepareOptions {
        PrepareOptions {
            check_hash: self.check_hash,
            bidir: self.bidir,
            commit: self.commit && !self.dry_run,
            dedup: self.dedup && !self.bidir,
            force: self.force,
        }
    }
}

/// Collects the whole scan in memory.
struct Collector {
    events: Vec<ScanEvent>,
    errors: Vec<DocError>,
    stop_on_error: bool,
}

impl ScanHandler for Collector {
    fn event(&mut self, event: ScanEvent) -> bool {
        self.events.push(event);
        true
    }

    fn error(&mut self, err: DocError) -> bool {
        tracing::debug!(error = %err, "scan error");
        self.errors.push(err);
        !self.stop_on_error
    }
}

/// Forwards the scan to the applying side. An error raises `cancel`, which
/// the executor checks before every action.
struct Forwarder<'c> {
    tx: SyncSender<ScanEvent>,
    errors: Vec<DocError>,
    stop_on_error: bool,
    cancel: &'c AtomicBool,
}

impl ScanHandler for Forwarder<'_> {
    fn event(&mut self, event: ScanEvent) -> bool {
        !self.cancel.load(Ordering::Relaxed) && self.tx.send(event).is_ok()
    }

    fn error(&mut self, err: DocError) -> bool {
        tracing::debug!(error = %err, "scan error");
        self.errors.push(err);
        if self.stop_on_error {
            self.cancel.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }
}

/// Absolute form of `path` with symlinks resolved as far as it exists.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => resolve(parent).join(name),
        _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}

fn validate(src: &Path, dst: &Path) -> Result<(), DocError> {
    if std::fs::symlink_metadata(src).is_err() {
        return Err(DocError::SourceNotFound {
            path: src.to_path_buf(),
        });
    }
    let (s, d) = (resolve(src), resolve(dst));
    if s != d && (d.starts_with(&s) || s.starts_with(&d)) {
        return Err(DocError::DestinationIsSubdirectory {
            src: src.to_path_buf(),
            dst: dst.to_path_buf(),
        });
    }
    Ok(())
}

/// Bring `dst` in line with `src` (and `src` with `dst` when bidirectional).
///
/// Entry-level failures are collected in the report rather than returned; an
/// `Err` means the run could not start at all.
pub fn sync(
    store: &dyn AttrStore,
    src: &Path,
    dst: &Path,
    filter: &ScanFilter,
    opts: &SyncOptions,
    progress: &dyn Progress,
) -> Result<SyncReport, DocError> {
    validate(src, dst)?;
    let prep_opts = opts.prepare_options();
    tracing::debug!(
        src = %src.display(),
        dst = %dst.display(),
        two_pass = opts.two_pass,
        dedup = prep_opts.dedup,
        bidir = opts.bidir,
        "starting sync"
    );

    let counters = ScanCounters::default();
    let cancel = AtomicBool::new(false);

    let mut executor = Executor::new(store, &counters, progress)
        .dry_run(opts.dry_run)
        .force(opts.force);
    if prep_opts.dedup {
        executor = executor.dedup(DedupIndex::new());
    }
    if opts.record_commits && !opts.dry_run {
        let roots: Vec<&Path> = if opts.bidir { vec![dst, src] } else { vec![dst] };
        let recorder = CommitRecorder::open(store, opts.integrity, &roots);
        if !recorder.is_empty() {
            executor = executor.record_commits(recorder);
        }
    }

    // Link sources can turn up anywhere in the destination, so dedup runs
    // always see the whole scan before applying anything.
    let two_pass = opts.two_pass || prep_opts.dedup;
    let (scan_errors, outcome) = if two_pass {
        let collector = Collector {
            events: Vec::new(),
            errors: Vec::new(),
            stop_on_error: opts.stop_on_error(),
        };
        let mut prep = Preparator::new(store, filter, prep_opts, &counters, progress, collector);
        prep.prepare(src, dst);
        let mut collected = prep.into_handler();
        collected
            .events
            .sort_by_key(|event| !matches!(event, ScanEvent::Duplicate { .. }));
        tracing::debug!(
            files = counters.files(),
            bytes = counters.total_bytes(),
            actions = collected.events.len(),
            "scan complete"
        );
        if opts.stop_on_error() && !collected.errors.is_empty() {
            let skipped = ExecOutcome {
                stopped: true,
                ..Default::default()
            };
            (collected.errors, skipped)
        } else {
            let outcome = executor.execute(collected.events, &cancel);
            (collected.errors, outcome)
        }
    } else {
        let counters_ref = &counters;
        let cancel_ref = &cancel;
        let stop_on_error = opts.stop_on_error();
        thread::scope(|scope| {
            let (tx, rx) = mpsc::sync_channel(opts.queue_capacity.max(1));
            let scanner = scope.spawn(move || {
                let forwarder = Forwarder {
                    tx,
                    errors: Vec::new(),
                    stop_on_error,
                    cancel: cancel_ref,
                };
                let mut prep =
                    Preparator::new(store, filter, prep_opts, counters_ref, progress, forwarder);
                prep.prepare(src, dst);
                prep.into_handler().errors
            });
            let outcome = executor.execute(rx, cancel_ref);
            let errors = scanner.join().unwrap_or_else(|_| {
                vec![DocError::Io {
                    source: std::io::Error::other("scan thread panicked"),
                }]
            });
            (errors, outcome)
        })
    };
    progress.finish();

    let mut report = SyncReport {
        dry_run: opts.dry_run,
        files_scanned: counters.files(),
        total_bytes: counters.total_bytes(),
        bytes_copied: outcome.bytes,
        actions: outcome.performed,
        conflicts: outcome.conflicts,
        removed_duplicates: Vec::new(),
        errors: scan_errors,
        warnings: outcome.warnings,
        stopped: outcome.stopped || cancel.load(Ordering::Relaxed),
    };
    report.errors.extend(outcome.errors);

    if opts.delete_duplicates && !report.stopped {
        remove_duplicates(&outcome.duplicates, opts.dry_run, &mut report);
    }
    Ok(report)
}

fn remove_duplicates(paths: &[PathBuf], dry_run: bool, report: &mut SyncReport) {
    for path in paths {
        if !dry_run {
            if let Err(e) = std::fs::remove_file(path) {
                report.errors.push(DocError::io_at(path, e));
                continue;
            }
            tracing::debug!(path = %path.display(), "removed duplicate");
        }
        report.removed_duplicates.push(path.clone());
    }
}
