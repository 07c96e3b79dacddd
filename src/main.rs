//! Metadium ledger API operator binary
//!
//! Loads configuration from the environment/.env file and runs one
//! subcommand against the configured gmet node.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use metadium_ledger::cli::{run, Cli};
use metadium_ledger::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    info!("=== Metadium Ledger API ===");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Network: {} / {}, node: {} (remote: {})",
        config.network_identifier().blockchain,
        config.network_identifier().network,
        config.node_url,
        config.remote_node
    );
    info!(
        "Trace gate: {} slots, tracer {}, timeout {}s",
        config.max_trace_concurrency,
        config.tracer,
        config.trace_timeout.as_secs()
    );

    run(cli, config).await
}
