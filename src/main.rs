//! Stack server (v1)
//!
//! A fixed-capacity LIFO byte-buffer shared by many clients over TCP.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                      STACK SERVER                        │
//!   Client        │  ┌──────────┐    ┌────────────┐    ┌──────────────────┐  │
//!   ──────────────┼─▶│ listener │───▶│  registry  │───▶│ protocol handler │  │
//!                 │  └──────────┘    │ admit/evict│    └───────┬──────────┘  │
//!   0xFF (busy) ◀─┼──────────────────┘            │            │             │
//!                 │                  └─────▲──────┘     ┌──────▼──────┐      │
//!                 │                        │            │ wait-lists  │      │
//!                 │                  ┌─────┴──────┐     │ coordinator │      │
//!                 │                  │  monitor   │     └──────┬──────┘      │
//!                 │                  │(disconnect)│     ┌──────▼──────┐      │
//!   Response    ◀─┼──────────────────┴────────────┴─────│ bounded     │      │
//!                 │                                     │ stack (N)   │      │
//!                 │                                     └─────────────┘      │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use stack_server::config::{load_config, validate_config, ConfigError, ServerConfig};
use stack_server::lifecycle::startup;
use stack_server::observability::logging;

#[derive(Parser)]
#[command(name = "stack-server")]
#[command(about = "Networked bounded LIFO stack server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the maximum number of simultaneous connections.
    #[arg(short, long)]
    max_connections: Option<usize>,
}

/// Log level used when the configuration itself cannot be resolved.
const FALLBACK_LOG_LEVEL: &str = "info";

/// Load the optional config file, then apply and re-validate CLI overrides.
fn resolve_config(cli: &Cli) -> Result<ServerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(max) = cli.max_connections {
        config.listener.max_connections = max;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(FALLBACK_LOG_LEVEL);
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(2);
        }
    };

    logging::init_logging(&config.observability.log_level);

    tracing::info!("stack-server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        capacity = config.stack.capacity,
        grace_period_ms = config.eviction.grace_period_ms,
        "Configuration loaded"
    );

    if let Err(e) = startup::run(config).await {
        tracing::error!(error = %e, "Fatal server error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
