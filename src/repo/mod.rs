//! Commands that work on a single tracked tree, plus `diff`/`missing` which
//! compare the logs of two.

pub mod compare;
pub mod dupes;
pub mod inspect;
pub mod record;
pub mod walk;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::attrs::FsAttrStore;
use crate::cli::args::{
    AttrArgs, CheckArgs, CommitArgs, CompareArgs, DupesArgs, InitArgs, ShowArgs, StatusArgs,
};
use crate::cli::find_source_dest;
use crate::commit::{init, read_commit, Commit};
use crate::config::DocConfig;
use crate::error::DocError;
use crate::progress::{BarProgress, LogProgress, NoProgress, Progress};
use crate::transfer::filter::ScanFilter;

use self::record::{commit_tree, CommitOptions};

fn dir_or_cwd(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(|| PathBuf::from("."))
}

fn report_errors(errors: &[DocError]) {
    for err in errors {
        eprintln!("{}", err);
    }
}

pub fn execute_init(args: InitArgs) -> Result<i32, DocError> {
    let dir = dir_or_cwd(args.dir);
    if !dir.is_dir() {
        return Err(DocError::NotADirectory { path: dir });
    }
    let store = FsAttrStore::new();
    if !init(&store, &dir)? {
        tracing::info!(dir = %dir.display(), "commit log already present");
    }
    Ok(0)
}

/// Refresh hashes under each path and rewrite the commit log.
///
/// Every newly hashed file is printed as `<hash> <path>` on stdout.
pub fn execute_commit(args: CommitArgs, config: &DocConfig) -> Result<i32, DocError> {
    let paths = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths
    };
    let opts = CommitOptions {
        force: args.force,
        write_log: !args.no_doccommit,
        docignore: config.sync.docignore && !args.no_docignore,
        policy: config.integrity.policy,
    };

    let store = FsAttrStore::new();
    let mut status = 0;
    for path in &paths {
        let summary = match commit_tree(&store, path, &opts) {
            Ok(summary) => summary,
            Err(e) => {
                eprintln!("{}: {}", path.display(), e);
                if let Some(hint) = e.suggestion() {
                    eprintln!("  hint: {}", hint);
                }
                status = 1;
                continue;
            }
        };
        for (hash, file) in &summary.updated {
            println!("{} {}", hash, file.display());
        }
        for file in &summary.forced {
            tracing::warn!(path = %file.display(), "made writable to record its hash");
        }
        if !summary.failures.is_empty() {
            if args.show_errors {
                report_errors(&summary.failures);
            }
            eprintln!(
                "{}: {} files could not be recorded (probably read only, retry with -f)",
                path.display(),
                summary.failures.len()
            );
        }
        tracing::debug!(path = %path.display(), entries = summary.entries, "committed");
    }
    Ok(status)
}

pub fn execute_check(args: CheckArgs) -> Result<i32, DocError> {
    let dir = dir_or_cwd(args.dir);
    let store = FsAttrStore::new();
    let (lines, errors) = inspect::check_tree(&store, &dir, args.all);
    for line in &lines {
        println!("{}", line);
    }
    report_errors(&errors);
    Ok(if errors.is_empty() { 0 } else { 1 })
}

pub fn execute_status(args: StatusArgs, config: &DocConfig) -> Result<i32, DocError> {
    let dir = dir_or_cwd(args.dir);
    let docignore = config.sync.docignore && !args.no_docignore;
    let store = FsAttrStore::new();

    let errors = if args.hashes {
        let (hashes, errors) = inspect::committed_hashes(&store, &dir, docignore)?;
        for (hash, path) in &hashes {
            println!("{}\t{}", hash, path.display());
        }
        errors
    } else {
        let (lines, errors) = inspect::status_tree(&store, &dir, docignore)?;
        for line in &lines {
            println!("{}", line);
        }
        errors
    };
    report_errors(&errors);
    Ok(if errors.is_empty() { 0 } else { 1 })
}

pub fn execute_show(args: ShowArgs) -> Result<i32, DocError> {
    let paths = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths
    };
    let store = FsAttrStore::new();
    let (reports, errors) = inspect::show_paths(&store, &paths, args.check);
    let rendered: Vec<String> = reports.iter().map(ToString::to_string).collect();
    if !rendered.is_empty() {
        println!("{}", rendered.join("\n\n"));
    }
    report_errors(&errors);
    Ok(if errors.is_empty() { 0 } else { 1 })
}

/// An unreadable log compares as an empty one.
fn commit_or_empty(dir: &Path) -> Commit {
    read_commit(dir).unwrap_or_else(|e| {
        tracing::warn!(dir = %dir.display(), error = %e, "cannot read commit log");
        Commit::new()
    })
}

fn compare_with(
    args: CompareArgs,
    compare: fn(&Commit, &Commit) -> Vec<compare::DiffLine>,
) -> Result<i32, DocError> {
    let (src, dst) = find_source_dest(args.from.as_deref(), args.to.as_deref(), &args.paths)?;
    let lines = compare(&commit_or_empty(&src), &commit_or_empty(&dst));
    for line in &lines {
        println!("{}", line);
    }
    Ok(0)
}

pub fn execute_diff(args: CompareArgs) -> Result<i32, DocError> {
    compare_with(args, compare::diff)
}

pub fn execute_missing(args: CompareArgs) -> Result<i32, DocError> {
    compare_with(args, compare::missing)
}

/// Print the merged `.docattr` attributes of a tree, or with `--key` the
/// value that applies to one entry.
pub fn execute_attr(args: AttrArgs) -> Result<i32, DocError> {
    let dir = dir_or_cwd(args.dir);
    let commit = read_commit(&dir)?;
    if let Some(key) = &args.key {
        let path = args.path.as_deref().unwrap_or("/");
        return Ok(match commit.attr(path, key) {
            Some(value) => {
                println!("{}", value);
                0
            }
            None => 1,
        });
    }
    let base = dir.display().to_string();
    for (item, values) in commit.attrs() {
        println!("{}/{}", base.trim_end_matches('/'), item.trim_start_matches('/'));
        for (key, value) in values {
            println!(" {}={}", key, value);
        }
    }
    Ok(0)
}

/// List duplicate files, one blank-line separated group per content hash.
pub fn execute_dupes(args: DupesArgs, config: &DocConfig, quiet: bool) -> Result<i32, DocError> {
    let dirs = if args.dirs.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.dirs
    };
    let filter = ScanFilter::new(&[], config.sync.docignore && !args.no_docignore)?;
    let progress: Box<dyn Progress> = if !args.progress {
        Box::new(NoProgress)
    } else if std::io::stderr().is_terminal() {
        Box::new(BarProgress::new(quiet))
    } else {
        Box::new(LogProgress)
    };

    let store = FsAttrStore::new();
    let (groups, mut errors) =
        dupes::find_dupes(&store, &dirs, &filter, args.show_links, progress.as_ref());
    for group in &groups {
        println!();
        println!("{}", group);
        if args.dedup && group.is_duplicated() {
            if let Err(e) = dupes::deduplicate(group) {
                errors.push(e);
            }
        }
    }
    report_errors(&errors);
    Ok(if errors.is_empty() { 0 } else { 1 })
}
