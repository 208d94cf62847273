//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};

/// Worktree Relay CLI
///
/// Message relay between an orchestrator session and the workers it spawns
/// in isolated worktrees.
#[derive(Parser, Debug)]
#[command(name = "wtr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Block until messages arrive for an orchestrator, or timeout
    Wait {
        /// Orchestrator session id to wait on
        #[arg(long = "orchestrator-id")]
        orchestrator_id: Option<String>,

        /// Timeout in seconds (default 300, capped at 600)
        #[arg(long)]
        timeout: Option<i64>,
    },

    /// Show an orchestrator's unread/total message counts
    Status {
        /// Orchestrator session id
        #[arg(long = "orchestrator-id")]
        orchestrator_id: Option<String>,
    },

    /// Apply (or check) pending store migrations
    Migrate {
        /// Report pending migrations without applying them
        #[arg(long)]
        check: bool,
    },

    /// Hook entry points (invoked by the host, payload on stdin)
    Hook(HookCommand),

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct HookCommand {
    #[command(subcommand)]
    pub action: HookAction,
}

#[derive(Subcommand, Debug)]
pub enum HookAction {
    /// Detect a successful PR creation and notify the orchestrator
    PrCompletion,

    /// Notify the orchestrator when a worker session ends
    SessionEnd,
}
