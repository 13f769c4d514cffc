//! Stowage CLI - container volume backups to S3-compatible storage
//!
//! This is the main entry point for the stowage command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Backup(args) => commands::backup::run(args, config).await,
        Commands::Restore(args) => commands::restore::run(args, config).await,
        Commands::List(args) => commands::list::run(args, config).await,
        Commands::Partitions => commands::list::partitions(config).await,
        Commands::Upload(args) => commands::upload::run(args, config).await,
        Commands::Split(args) => commands::chunk::split(args).await,
        Commands::Join(args) => commands::chunk::join(args).await,
        Commands::Volume(cmd) => commands::volume::run(cmd, config).await,
        Commands::Key(cmd) => commands::key::run(cmd, config).await,
        Commands::File(cmd) => commands::file::run(cmd, config).await,
        Commands::DeriveKey(args) => commands::derive_key::run(args, config).await,
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
