//! SOS Device CLI
//!
//! `run` starts a device session on this terminal; `watch` shows the relay
//! traffic the way a dispatcher sees it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use sos_device::output::{print_error, print_info, stage_label};
use sos_device::{describe, watch, DeviceConfig, DeviceSession, Inbound};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Device CLI
#[derive(Parser)]
#[command(name = "sos-device")]
#[command(about = "SOS Device - staged emergency escalation from the terminal", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SOS_DEVICE_CONFIG", global = true)]
    config: Option<String>,

    /// Relay socket address
    #[arg(short, long, env = "SOS_DEVICE_RELAY_URL", global = true)]
    relay: Option<String>,

    /// Log level
    #[arg(long, env = "SOS_DEVICE_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "SOS_DEVICE_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run a device session
    Run {
        /// Identifier stamped on every envelope
        #[arg(long)]
        device_id: Option<String>,

        /// Profile file
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Arm the check-in timer at start
        #[arg(long)]
        dead_man: bool,
    },

    /// Print every envelope passing through the relay
    Watch,

    /// Show the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let result = runtime.block_on(execute(cli));
    // A pending console read holds a blocking thread; don't wait on it.
    runtime.shutdown_timeout(Duration::from_millis(250));
    result
}

async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut config = DeviceConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;

    if let Some(relay) = cli.relay {
        config.relay_url = relay;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

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
            .with(tracing_subscriber::fmt::layer().without_time())
            .init();
    }

    match cli.command {
        Commands::Run {
            device_id,
            profile,
            dead_man,
        } => {
            if let Some(id) = device_id {
                config.escalation.device_id = id;
            }
            if let Some(path) = profile {
                config.profile_path = path;
            }

            print_info(&format!(
                "Device {} reporting to {}",
                config.escalation.device_id.bold(),
                config.relay_url
            ));

            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let result = DeviceSession::new(config)
                .with_dead_man(dead_man)
                .run(input)
                .await;
            if let Err(e) = &result {
                print_error(&e.to_string());
            }
            result.context("device session failed")
        }

        Commands::Watch => {
            print_info(&format!("Watching {} (Ctrl+C to stop)", config.relay_url));
            println!();

            watch(&config.relay_url, |inbound| match inbound {
                Inbound::Handshake(handshake) => {
                    println!("{} {}", "✓".green(), handshake.message);
                }
                Inbound::Envelope(envelope) => {
                    let time = clock_time(envelope.timestamp());
                    println!(
                        "{} {} {}",
                        time.dimmed(),
                        stage_label(envelope.mode()),
                        describe(&envelope)
                    );
                }
                Inbound::Unreadable(e) => {
                    println!("{} unreadable message: {}", "?".yellow(), e);
                }
            })
            .await
            .context("relay connection failed")
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// `HH:MM:SS` part of an RFC 3339 timestamp, or the raw text
fn clock_time(timestamp: &str) -> String {
    timestamp
        .split_once('T')
        .and_then(|(_, time)| time.get(..8))
        .unwrap_or(timestamp)
        .to_string()
}
