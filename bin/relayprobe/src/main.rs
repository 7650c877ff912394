//! relayprobe: provisions node fleets and verifies relay circuits between them.

mod cli;
mod commands;
mod config;

use clap::Parser;
use relayprobe_observability::init_logging;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(&cli.logs)?;

    match cli.command {
        Commands::Daemon(args) => commands::daemon::run(args).await,
        Commands::Run(args) => commands::run::run(args, &cli.logs).await,
        Commands::Config(args) => commands::config::run(&args),
    }
}
