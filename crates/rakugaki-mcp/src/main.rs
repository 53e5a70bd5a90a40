//! Rakugaki MCP server binary.
//!
//! Usage:
//!   # In-memory checkpoints (lost on exit)
//!   cargo run -p rakugaki-mcp
//!
//!   # Checkpoints as JSON files in a directory
//!   cargo run -p rakugaki-mcp -- --checkpoint-dir ~/.local/share/rakugaki/checkpoints
//!
//!   # Hosted key-value store
//!   UPSTASH_REDIS_REST_URL=... UPSTASH_REDIS_REST_TOKEN=... cargo run -p rakugaki-mcp
//!
//! Test with MCP inspector:
//!   npx @modelcontextprotocol/inspector cargo run -p rakugaki-mcp

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tracing_subscriber::{EnvFilter, fmt};

use rakugaki_kernel::store::{StoreConfig, StoreLimits};
use rakugaki_mcp::RakugakiMcp;

/// MCP server for streamed, checkpointed diagrams.
#[derive(Parser, Debug)]
#[command(name = "rakugaki-mcp")]
#[command(about = "MCP server for streamed, checkpointed diagrams")]
struct Args {
    /// Store checkpoints as files in this directory (ignored when a remote
    /// store is configured in the environment)
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing to stderr (MCP uses stdio for protocol)
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let args = Args::parse();

    let store = StoreConfig::from_env(args.checkpoint_dir)?
        .open(StoreLimits::default())
        .await?;
    let mcp = RakugakiMcp::new(store);

    let service = mcp
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("MCP server error: {:?}", e);
        })?;

    tracing::info!("rakugaki-mcp server ready");

    service.waiting().await?;

    tracing::info!("rakugaki-mcp server shutting down");
    Ok(())
}
