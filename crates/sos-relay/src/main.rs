//! SOS Relay Daemon
//!
//! Hosts the signal relay socket and, optionally, the dispatcher dashboard.

use clap::Parser;
use sos_relay::{RelayConfig, RelayError, RelayResult, Server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relay daemon CLI
#[derive(Parser)]
#[command(name = "sos-relayd")]
#[command(about = "SOS Relay - fans every signal out to all connected peers", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SOS_RELAY_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the configuration file)
    #[arg(short, long, env = "SOS_RELAY_LISTEN_ADDR")]
    listen: Option<String>,

    /// Directory with the built dashboard
    #[arg(long, env = "SOS_RELAY_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "SOS_RELAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SOS_RELAY_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> RelayResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = RelayConfig::load(cli.config.as_deref())
        .map_err(|e| RelayError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if cli.static_dir.is_some() {
        config.server.static_dir = cli.static_dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
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

    // Print startup banner
    println!(
        r#"
  ____   ___  ____
 / ___| / _ \/ ___|
 \___ \| | | \___ \
  ___) | |_| |___) |
 |____/ \___/|____/

  Dispatch Relay Hub
  Version: {}
  Listening: {}
  Dashboard: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.server.listen_addr,
        config
            .server
            .static_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "not served".to_string())
    );

    let server = Server::new(config)?;
    server.run().await
}
