//! wtr-server - Worktree Relay MCP server
//!
//! Exposes the relay operation surface as MCP tools over stdio.

use anyhow::Result;
use rmcp::{transport::stdio, ServiceExt};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod server;

use server::RelayServer;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP transport; all logging goes to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("wtr_server=info".parse()?))
        .init();

    info!("wtr-server v{}", env!("CARGO_PKG_VERSION"));

    let service = RelayServer::new().serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
