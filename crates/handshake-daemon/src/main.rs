//! Handshake daemon
//!
//! Serves the realtime channels and callback endpoints of the QR identity
//! handshake and runs the change watcher that connects them.

use clap::Parser;
use handshake_daemon::error::{DaemonError, DaemonResult};
use handshake_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Handshake daemon CLI
#[derive(Parser)]
#[command(name = "handshaked")]
#[command(about = "Handshake daemon - QR identity session correlation", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "HANDSHAKE_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "HANDSHAKE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Externally reachable base URL
    #[arg(long, env = "HANDSHAKE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Log level
    #[arg(long, env = "HANDSHAKE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "HANDSHAKE_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(public_url) = cli.public_url {
        config.server.public_url = public_url;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        public_url = %config.server.public_url,
        poll_interval_ms = config.watcher.poll_interval_ms,
        max_wait_secs = config.watcher.max_wait_secs,
        "Starting handshake daemon"
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
