pub mod action;
pub mod driver;
pub mod executor;
pub mod prepare;
pub mod report;

use std::io::IsTerminal;

use crate::attrs::FsAttrStore;
use crate::cli::args::TransferArgs;
use crate::cli::find_source_dest;
use crate::config::DocConfig;
use crate::error::DocError;
use crate::progress::{BarProgress, LogProgress, Progress};
use crate::transfer::filter::ScanFilter;

use self::driver::{sync, SyncOptions};

impl SyncOptions {
    /// Configuration defaults overridden by command-line flags.
    pub fn from_args(args: &TransferArgs, bidir: bool, config: &DocConfig) -> Self {
        Self {
            dry_run: args.dry_run,
            force: args.force || config.sync.force,
            bidir,
            dedup: args.wants_dedup(),
            delete_duplicates: args.wants_delete(),
            check_hash: args.check_hash,
            commit: args.commit,
            two_pass: args.two_pass || config.sync.two_pass,
            queue_capacity: config.sync.queue_capacity,
            record_commits: config.sync.record_commits && !args.no_record,
            integrity: config.integrity.policy,
        }
    }
}

/// Entry point for `doctrack cp` (one way) and `doctrack sync` (both ways).
///
/// Returns the process exit code: 0 clean, 1 after errors, 2 when conflicts
/// were stored.
pub fn execute_transfer(
    args: TransferArgs,
    bidir: bool,
    config: &DocConfig,
    quiet: bool,
) -> Result<i32, DocError> {
    let (src, dst) = find_source_dest(args.from.as_deref(), args.to.as_deref(), &args.paths)?;
    if bidir && args.wants_dedup() {
        tracing::warn!("deduplication is not available for bidirectional sync, ignoring -d");
    }

    let opts = SyncOptions::from_args(&args, bidir, config);
    let filter = ScanFilter::new(&args.exclude, config.sync.docignore && !args.no_docignore)?;
    let progress: Box<dyn Progress> = if args.json || !std::io::stderr().is_terminal() {
        Box::new(LogProgress)
    } else {
        Box::new(BarProgress::new(quiet))
    };

    let store = FsAttrStore::new();
    let report = sync(&store, &src, &dst, &filter, &opts, progress.as_ref())?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        if opts.dry_run {
            report.print_plan();
        }
        report.print_conflicts();
        report.print_summary(quiet);
    }
    Ok(report.exit_code())
}
