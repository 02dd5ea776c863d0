use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod attrs;
mod cli;
mod commit;
mod config;
mod error;
mod hash;
mod progress;
mod repo;
mod sync;
mod transfer;

use cli::args::{Cli, Commands};
use config::{DocConfig, Verbosity};
use error::DocError;

fn main() {
    let cli = Cli::parse();

    let verbosity = Verbosity::from((cli.quiet, cli.verbose));

    // RUST_LOG wins over -q/-v
    let filter = verbosity.as_tracing_filter();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Verbosity level: {:?}", verbosity);

    let config = match config::load_config() {
        Ok(config) => config,
        Err(err) => {
            display_error(&err);
            std::process::exit(1);
        }
    };

    match run(cli, &config) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            display_error(&err);
            std::process::exit(1);
        }
    }
}

/// Execute the dispatched command, returning the process exit code.
fn run(cli: Cli, config: &DocConfig) -> Result<i32, DocError> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Init(args) => repo::execute_init(args),
        Commands::Commit(args) => repo::execute_commit(args, config),
        Commands::Check(args) => repo::execute_check(args),
        Commands::Status(args) => repo::execute_status(args, config),
        Commands::Show(args) => repo::execute_show(args),
        Commands::Diff(args) => repo::execute_diff(args),
        Commands::Missing(args) => repo::execute_missing(args),
        Commands::Attr(args) => repo::execute_attr(args),
        Commands::Dupes(args) => repo::execute_dupes(args, config, quiet),
        Commands::Cp(args) => sync::execute_transfer(args, false, config, quiet),
        Commands::Sync(args) => sync::execute_transfer(args, true, config, quiet),
        Commands::Completions(args) => {
            clap_complete::generate(
                args.shell,
                &mut Cli::command(),
                "doctrack",
                &mut std::io::stdout(),
            );
            Ok(0)
        }
    }
}

/// Display a DocError with optional suggestion hint to stderr.
fn display_error(err: &DocError) {
    eprintln!("error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        eprintln!("  hint: {}", suggestion);
    }
}
