//! branchkv server - one shard of a partitioned, versioned key-value store

use branchkv_server::{run_server_with_shutdown, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "branchkv-server")]
#[command(about = "Shard server of the branchkv versioned key-value store")]
#[command(version)]
struct Args {
    /// Configuration file (JSON, TOML or YAML)
    #[arg(short, long, env = "BRANCHKV_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address peers use to reach this server
    #[arg(long)]
    self_address: Option<String>,

    /// Node count above which the range is split
    #[arg(short, long)]
    threshold: Option<usize>,

    /// Enable debug logging
    #[arg(short, long, env = "BRANCHKV_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Parse arguments
    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "branchkv_server={},branchkv_client={},tower_http=debug",
                    log_level, log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build configuration, command-line flags win
    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(self_address) = args.self_address {
        config.self_address = self_address;
    }
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }

    tracing::info!(
        "Starting branchkv server {} on {}",
        config.self_address,
        config.bind_addr()
    );
    if config.servers.is_empty() {
        tracing::warn!("No peer servers configured, running a single shard");
    }

    run_server_with_shutdown(config, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
}
