//! hush-relay binary entry point.
//!
//! Usage:
//! ```bash
//! hush-relay --config relay.toml
//! RUST_LOG=hush_relay=debug hush-relay
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use hush_relay::config::Config;
use hush_relay::server::{self, ChatRelay};
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "relay.toml";

/// Zero-knowledge message, signaling and blind file relay.
#[derive(Parser, Debug)]
#[command(name = "hush-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Override the bind address from the configuration
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hush_relay=info")),
        )
        .init();

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }

    tracing::info!("hush-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let bind_address = config.server.bind_address.clone();
    let relay = ChatRelay::start(config)
        .await
        .context("Failed to start relay")?;

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;

    server::serve(relay, listener, shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("hush-relay stopped");
    Ok(())
}

/// Load the configuration file, falling back to defaults when the default
/// path does not exist.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() && path.as_os_str() == DEFAULT_CONFIG {
        tracing::info!("No {} found, using default configuration", DEFAULT_CONFIG);
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }

    Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
