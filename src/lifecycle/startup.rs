//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when enabled
//! - Bind the listener (fatal on failure)
//! - Run the server until a shutdown signal arrives
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listener binds last (traffic only when ready)

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::lifecycle::{signals, Shutdown};
use crate::net::Listener;
use crate::observability::metrics;
use crate::server::StackServer;

/// Bring the service up and serve until SIGINT/SIGTERM.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    if config.observability.metrics_enabled {
        // Validation already checked that the address parses.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr)?;
        }
    }

    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let server = StackServer::new(&config);
    server.run(listener, shutdown.subscribe()).await
}
