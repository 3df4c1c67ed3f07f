//! Closed-connection monitor.
//!
//! # States
//! ```text
//! Running ──peer EOF / socket error──▶ DetectedClosed   (closes via registry)
//!    │
//!    └──closed by any other path──────▶ StoppedExternally
//! ```
//!
//! The handler may be parked in the `WaitCoordinator` with no reason to touch
//! its socket, so this task watches the socket on its behalf. Each probe waits
//! for read readiness for at most `probe_interval`, then does a non-blocking
//! 1-byte read; the closed flag is re-checked between probes and the
//! cancellation signal ends the loop immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::Instrument;

use crate::net::connection::{Connection, Probe};
use crate::net::registry::ConnectionRegistry;

/// Terminal state of a monitor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The monitor saw the peer go away and closed the connection.
    DetectedClosed,
    /// Someone else closed the connection first.
    StoppedExternally,
}

/// Per-connection disconnect watcher.
pub struct ConnectionMonitor {
    connection: Arc<Connection>,
    registry: Arc<ConnectionRegistry>,
    probe_interval: Duration,
}

impl ConnectionMonitor {
    pub fn new(
        connection: Arc<Connection>,
        registry: Arc<ConnectionRegistry>,
        probe_interval: Duration,
    ) -> Self {
        Self {
            connection,
            registry,
            probe_interval,
        }
    }

    /// Run the monitor on its own task.
    pub fn spawn(self) -> JoinHandle<MonitorOutcome> {
        tokio::spawn(self.run().in_current_span())
    }

    pub async fn run(self) -> MonitorOutcome {
        let conn = &self.connection;

        while !conn.is_closed() {
            tokio::select! {
                _ = conn.closed() => break,
                probe = time::timeout(self.probe_interval, conn.probe()) => match probe {
                    // Deadline passed with nothing to read; re-arm.
                    Err(_) => {}
                    Ok(Ok(Probe::Idle)) => {}
                    Ok(Ok(Probe::Data)) => {
                        tracing::trace!(connection_id = %conn.id(), "Discarded stray byte");
                    }
                    Ok(Ok(Probe::Eof)) => {
                        tracing::debug!(connection_id = %conn.id(), "Peer disconnected");
                        self.registry.close(conn);
                        return MonitorOutcome::DetectedClosed;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(connection_id = %conn.id(), error = %e, "Socket error while monitoring");
                        self.registry.close(conn);
                        return MonitorOutcome::DetectedClosed;
                    }
                },
            }
        }

        MonitorOutcome::StoppedExternally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::testing::connection_pair;
    use crate::net::registry::DEFAULT_GRACE_PERIOD;

    async fn monitored() -> (
        Arc<Connection>,
        Arc<ConnectionRegistry>,
        tokio::net::TcpStream,
        JoinHandle<MonitorOutcome>,
    ) {
        let registry = Arc::new(ConnectionRegistry::new(4, DEFAULT_GRACE_PERIOD));
        let (conn, client) = connection_pair().await;
        let conn = Arc::new(conn);
        registry.admit(conn.clone()).unwrap();
        let handle =
            ConnectionMonitor::new(conn.clone(), registry.clone(), Duration::from_millis(10))
                .spawn();
        (conn, registry, client, handle)
    }

    #[tokio::test]
    async fn detects_peer_disconnect() {
        let (conn, registry, client, handle) = monitored().await;
        drop(client);

        let outcome = time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, MonitorOutcome::DetectedClosed);
        assert!(conn.is_closed());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn stops_when_closed_elsewhere() {
        let (conn, registry, _client, handle) = monitored().await;
        time::sleep(Duration::from_millis(30)).await;
        registry.close(&conn);

        let outcome = time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, MonitorOutcome::StoppedExternally);
    }

    #[tokio::test]
    async fn stray_bytes_do_not_close() {
        use tokio::io::AsyncWriteExt;

        let (conn, registry, mut client, handle) = monitored().await;
        client.write_all(b"xyz").await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert!(!conn.is_closed());

        registry.close(&conn);
        let outcome = handle.await.unwrap();
        assert_eq!(outcome, MonitorOutcome::StoppedExternally);
    }
}
