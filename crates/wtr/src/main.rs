//! wtr - Worktree Relay CLI
//!
//! Blocking-wait and hook entry points for orchestrator/worker message
//! coordination.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Results go to stdout as JSON; all logging goes to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("wtr=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Wait {
            orchestrator_id,
            timeout,
        } => commands::wait::execute(orchestrator_id, timeout).await,
        Commands::Status { orchestrator_id } => commands::status::execute(orchestrator_id),
        Commands::Migrate { check } => commands::migrate::execute(check),
        Commands::Hook(cmd) => commands::hook::execute(cmd),
        Commands::Version => {
            println!("wtr {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
