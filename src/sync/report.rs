use std::path::PathBuf;

use bytesize::ByteSize;
use serde::Serialize;

use super::action::{CopyAction, EntryKind};
use crate::error::DocError;

/// Outcome of one `cp` or `sync` run.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub dry_run: bool,
    pub files_scanned: u64,
    pub total_bytes: u64,
    pub bytes_copied: u64,
    pub actions: Vec<CopyAction>,
    pub conflicts: Vec<PathBuf>,
    pub removed_duplicates: Vec<PathBuf>,
    pub errors: Vec<DocError>,
    pub warnings: Vec<DocError>,
    /// The run ended before everything planned was applied.
    pub stopped: bool,
}

#[derive(Serialize)]
struct ActionJson {
    kind: &'static str,
    src: String,
    dst: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

#[derive(Serialize)]
struct ReportJson {
    dry_run: bool,
    files_scanned: u64,
    total_bytes: u64,
    bytes_copied: u64,
    actions: Vec<ActionJson>,
    conflicts: Vec<String>,
    removed_duplicates: Vec<String>,
    errors: Vec<String>,
    warnings: Vec<String>,
    stopped: bool,
    exit_code: i32,
}

fn action_kind(act: &CopyAction) -> &'static str {
    if act.link {
        "link"
    } else if act.conflict {
        "conflict"
    } else {
        match act.src_kind {
            EntryKind::Dir => "mkdir",
            EntryKind::Symlink => "symlink",
            EntryKind::File => "copy",
        }
    }
}

impl SyncReport {
    /// 0 when everything was applied, 1 after errors, 2 when conflicts were
    /// stored beside existing files.
    pub fn exit_code(&self) -> i32 {
        if !self.errors.is_empty() || self.stopped {
            1
        } else if !self.conflicts.is_empty() {
            2
        } else {
            0
        }
    }

    pub fn count(&self, kind: &str) -> usize {
        self.actions.iter().filter(|a| action_kind(a) == kind).count()
    }

    /// List planned actions on stdout. Used for dry runs.
    pub fn print_plan(&self) {
        for action in &self.actions {
            println!("{}", action);
        }
        for path in &self.removed_duplicates {
            println!("  REMOVE    {}", path.display());
        }
    }

    /// Conflict copies are command output: one `CONFLICT <path>` line each on
    /// stdout.
    pub fn print_conflicts(&self) {
        for path in &self.conflicts {
            println!("CONFLICT {}", path.display());
        }
    }

    /// Print errors, warnings and totals to stderr.
    pub fn print_summary(&self, quiet: bool) {
        for err in &self.errors {
            eprintln!("error: {}", err);
            if let Some(hint) = err.suggestion() {
                eprintln!("  hint: {}", hint);
            }
        }
        if quiet {
            return;
        }
        for warning in &self.warnings {
            eprintln!("warning: {}", warning);
        }

        let verb = if self.dry_run { "Would apply" } else { "Applied" };
        eprintln!(
            "{} {} actions: {} copied, {} linked, {} directories, {} conflicts ({})",
            verb,
            self.actions.len(),
            self.count("copy") + self.count("symlink"),
            self.count("link"),
            self.count("mkdir"),
            self.count("conflict"),
            ByteSize(if self.dry_run {
                self.total_bytes
            } else {
                self.bytes_copied
            }),
        );
        if !self.removed_duplicates.is_empty() {
            eprintln!("  {} duplicates removed", self.removed_duplicates.len());
        }
        if self.stopped {
            eprintln!("  stopped early; rerun with -f to continue past errors");
        }
    }

    pub fn to_json(&self) -> Result<String, DocError> {
        let display = |p: &PathBuf| p.display().to_string();
        let json = ReportJson {
            dry_run: self.dry_run,
            files_scanned: self.files_scanned,
            total_bytes: self.total_bytes,
            bytes_copied: self.bytes_copied,
            actions: self
                .actions
                .iter()
                .map(|a| ActionJson {
                    kind: action_kind(a),
                    src: display(&a.src),
                    dst: display(&a.dst),
                    size: a.size,
                    hash: a.hash.as_ref().map(|h| h.to_string()),
                })
                .collect(),
            conflicts: self.conflicts.iter().map(display).collect(),
            removed_duplicates: self.removed_duplicates.iter().map(display).collect(),
            errors: self.errors.iter().map(|e| e.to_string()).collect(),
            warnings: self.warnings.iter().map(|e| e.to_string()).collect(),
            stopped: self.stopped,
            exit_code: self.exit_code(),
        };
        Ok(serde_json::to_string_pretty(&json)?)
    }
}
