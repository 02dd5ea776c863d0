use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "doctrack",
    version,
    about = "Track file content hashes and synchronize trees without losing edits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v for verbose, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode: suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the .dirstore and an empty commit log
    Init(InitArgs),

    /// Hash modified files and record the tree in its commit log
    Commit(CommitArgs),

    /// Re-hash files and report those whose content changed
    Check(CheckArgs),

    /// List untracked, modified and conflicting files
    Status(StatusArgs),

    /// Show hash, conflict and status details of files
    Show(ShowArgs),

    /// Compare the commit logs of two trees
    Diff(CompareArgs),

    /// List committed files of SRC that DEST lacks or has with other content
    Missing(CompareArgs),

    /// Print attributes declared in .docattr files
    Attr(AttrArgs),

    /// List files with identical cached hashes, optionally hard-linking them
    Dupes(DupesArgs),

    /// Copy SRC over to DEST, storing differing files as conflicts
    Cp(TransferArgs),

    /// Synchronize SRC and DEST in both directions
    Sync(TransferArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the `doctrack init` command.
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Tree root (default: current directory)
    pub dir: Option<PathBuf>,
}

/// Arguments for the `doctrack commit` command.
#[derive(clap::Args, Debug)]
pub struct CommitArgs {
    /// Directories or files to commit (default: current directory)
    pub paths: Vec<PathBuf>,

    /// Write attributes on read-only files and accept a manually edited log
    #[arg(short, long)]
    pub force: bool,

    /// Only refresh cached hashes, leave .doccommit alone
    #[arg(short = 'n', long)]
    pub no_doccommit: bool,

    /// Do not skip directories marked with an empty .docignore
    #[arg(long)]
    pub no_docignore: bool,

    /// Show each file whose attributes could not be written
    #[arg(short = 'e', long)]
    pub show_errors: bool,
}

/// Arguments for the `doctrack check` command.
#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Directory to check (default: current directory)
    pub dir: Option<PathBuf>,

    /// Also re-hash files modified since their hash was recorded
    #[arg(short, long)]
    pub all: bool,
}

/// Arguments for the `doctrack status` command.
#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Directory to scan (default: current directory)
    pub dir: Option<PathBuf>,

    /// Only list unchanged committed files with their hash
    #[arg(short = 'c', long)]
    pub hashes: bool,

    /// Do not skip directories marked with an empty .docignore
    #[arg(long)]
    pub no_docignore: bool,
}

/// Arguments for the `doctrack show` command.
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Files or directories to describe (default: current directory)
    pub paths: Vec<PathBuf>,

    /// Re-hash each file and compare with the recorded hash
    #[arg(short = 'c', long)]
    pub check: bool,
}

/// Arguments for `doctrack diff` and `doctrack missing`.
#[derive(clap::Args, Debug)]
pub struct CompareArgs {
    /// [SRC] DEST
    #[arg(num_args = 0..=2)]
    pub paths: Vec<PathBuf>,

    /// Source directory
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Destination directory
    #[arg(long)]
    pub to: Option<PathBuf>,
}

/// Arguments for the `doctrack attr` command.
#[derive(clap::Args, Debug)]
pub struct AttrArgs {
    /// Directory whose attributes to print (default: current directory)
    pub dir: Option<PathBuf>,

    /// Print only the value of KEY, inherited from enclosing directories
    #[arg(short, long)]
    pub key: Option<String>,

    /// Entry to look KEY up for, relative to DIR (default: DIR itself)
    #[arg(short, long, requires = "key")]
    pub path: Option<String>,
}

/// Arguments for the `doctrack dupes` command.
#[derive(clap::Args, Debug)]
pub struct DupesArgs {
    /// Directories to search (default: current directory)
    pub dirs: Vec<PathBuf>,

    /// Also list groups whose files are already hard links of each other
    #[arg(short = 'l', long)]
    pub show_links: bool,

    /// Replace duplicates with hard links to the first file on each device
    #[arg(short, long)]
    pub dedup: bool,

    /// Show progress while walking
    #[arg(short, long)]
    pub progress: bool,

    /// Do not skip directories marked with an empty .docignore
    #[arg(long)]
    pub no_docignore: bool,
}

/// Arguments shared by `doctrack cp` and `doctrack sync`.
#[derive(clap::Args, Debug)]
pub struct TransferArgs {
    /// [SRC] DEST (SRC defaults to the current directory)
    #[arg(num_args = 0..=2)]
    pub paths: Vec<PathBuf>,

    /// Source directory
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Destination directory
    #[arg(long)]
    pub to: Option<PathBuf>,

    /// Print what would be done without touching anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Keep going after errors
    #[arg(short, long)]
    pub force: bool,

    /// Link identical destination files instead of copying (-dd also removes them)
    #[arg(short = 'd', long = "dedup", action = clap::ArgAction::Count)]
    pub dedup: u8,

    /// Like -dd: deduplicate and remove the duplicates
    #[arg(long = "dd")]
    pub dedup_delete: bool,

    /// Hash destination files without a valid cached hash when deduplicating
    #[arg(short = 'c', long)]
    pub check_hash: bool,

    /// Record hashes computed while comparing
    #[arg(long)]
    pub commit: bool,

    /// Scan the whole tree before copying anything
    #[arg(short = '2', long)]
    pub two_pass: bool,

    /// Exclude files matching glob pattern (can be repeated)
    #[arg(long, action = clap::ArgAction::Append)]
    pub exclude: Vec<String>,

    /// Do not skip directories marked with an empty .docignore
    #[arg(long)]
    pub no_docignore: bool,

    /// Do not append copied files to the destination's commit log
    #[arg(long)]
    pub no_record: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl TransferArgs {
    pub fn wants_dedup(&self) -> bool {
        self.dedup > 0 || self.dedup_delete
    }

    pub fn wants_delete(&self) -> bool {
        self.dedup > 1 || self.dedup_delete
    }
}

/// Arguments for the `doctrack completions` command.
#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
