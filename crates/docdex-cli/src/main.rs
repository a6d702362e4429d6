//! docdex command-line interface.
//!
//! The CLI is a thin collaborator around `docdex-core`: it reads the
//! environment, assembles the explicit core [`docdex_core::Config`], and
//! dispatches subcommands. All indexing and search semantics live in the
//! core crate.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "docdex=debug" } else { "docdex=info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = args.load_config()?;
    let context = commands::AppContext::new(config, args.server.clone())?;

    match args.command {
        cli::Command::Index(index_args) => commands::index::run(&context, index_args).await,
        cli::Command::Refresh(refresh_args) => {
            commands::index::refresh(&context, refresh_args).await
        },
        cli::Command::Search(search_args) => commands::search::run(&context, search_args).await,
        cli::Command::List => commands::list::run(&context),
        cli::Command::Remove(remove_args) => commands::remove::run(&context, remove_args),
        cli::Command::Jobs(jobs_args) => commands::jobs::run(&context, jobs_args).await,
        cli::Command::Cancel(cancel_args) => commands::jobs::cancel(&context, cancel_args).await,
    }
}
