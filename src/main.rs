use anyhow::Result;
use clap::Parser;
use code_index::{CodeIndexClient, CodeIndexMcpServer, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Semantic code search over local folders, served over MCP stdio
#[derive(Debug, Parser)]
#[command(name = "code-index", version, long_version = LONG_VERSION)]
struct Args {
    /// Path to a TOML config file (defaults to the platform config directory)
    #[arg(short, long, env = "CODE_INDEX_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("code_index=info")),
        )
        .init();

    let config = Config::load(args.config.as_deref())?;
    let watch = config.watcher.enabled;

    let client = Arc::new(CodeIndexClient::new(config).await?);
    if watch {
        client.start_watcher().await?;
    }

    CodeIndexMcpServer::with_client(client).serve_stdio().await?;

    Ok(())
}
