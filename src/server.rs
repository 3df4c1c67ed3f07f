//! Server accept loop.
//!
//! # Responsibilities
//! - Accept raw sockets from the listener
//! - Run admission control through the `ConnectionRegistry`
//! - Answer refused connections with the busy byte and close them
//! - Spawn one `ProtocolHandler` task per admitted connection
//! - Close every connection on shutdown
//!
//! Accept failures and per-connection errors are logged and never stop the loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::listener::ListenerError;
use crate::net::{Connection, Listener};
use crate::observability::metrics;
use crate::protocol::{ProtocolHandler, BUSY};
use crate::service::StackService;

/// Delay before accepting again after an accept error.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// The stack server.
pub struct StackServer {
    service: Arc<StackService>,
}

impl StackServer {
    /// Create a new server with the given configuration.
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_service(Arc::new(StackService::new(config)))
    }

    pub fn with_service(service: Arc<StackService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<StackService> {
        &self.service
    }

    /// Run the accept loop until `shutdown` fires.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %addr,
            max_connections = self.service.registry.max_connections(),
            "Stack server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.dispatch(stream, peer_addr),
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Server received shutdown signal, stopping accept loop");
                    break;
                }
            }
        }

        let closed = self.service.registry.close_all();
        tracing::info!(closed, "Stack server stopped");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let connection = Arc::new(Connection::new(stream, peer_addr));

        if let Err(e) = self.service.registry.admit(connection.clone()) {
            tracing::warn!(peer_addr = %peer_addr, error = %e, "Connection refused");
            metrics::record_rejected();
            tokio::spawn(async move {
                if let Err(e) = connection.write_all(&[BUSY]).await {
                    tracing::debug!(peer_addr = %peer_addr, error = %e, "Failed to send busy byte");
                }
            });
            return;
        }

        let span = tracing::debug_span!(
            "connection",
            connection_id = %connection.id(),
            peer_addr = %peer_addr
        );
        let handler = ProtocolHandler::new(self.service.clone(), connection);
        tokio::spawn(handler.run().instrument(span));
    }
}
