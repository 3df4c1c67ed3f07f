//! Connection admission control.
//!
//! # Responsibilities
//! - Track every open connection, keyed by id
//! - Enforce `max_connections`, evicting the oldest connection when it is past
//!   the grace period and rejecting otherwise
//! - Provide the one idempotent close path used by handlers, monitors,
//!   evictions and shutdown
//!
//! # Design Decisions
//! - A single mutex serializes map updates; it is never held across I/O
//! - Eviction only ever targets the single oldest connection: if that one is
//!   still young, nobody is evicted and admission fails

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::AdmissionError;
use crate::net::connection::{Connection, ConnectionId};
use crate::observability::metrics;

/// Default minimum age before a connection may be evicted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Registry of live connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    max_connections: usize,
    grace_period: Duration,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize, grace_period: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::with_capacity(max_connections)),
            max_connections,
            grace_period,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ConnectionId, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly accepted connection, evicting a stale one if full.
    pub fn admit(&self, connection: Arc<Connection>) -> Result<(), AdmissionError> {
        let mut connections = self.entries();

        if connections.len() >= self.max_connections
            && !Self::evict_oldest_locked(&mut connections, self.grace_period, Instant::now())
        {
            return Err(AdmissionError::ServiceBusy {
                active: connections.len(),
                max: self.max_connections,
            });
        }

        tracing::debug!(
            connection_id = %connection.id(),
            peer_addr = %connection.peer_addr(),
            active = connections.len() + 1,
            "Connection admitted"
        );
        connections.insert(connection.id(), connection);
        metrics::record_admitted(connections.len());
        Ok(())
    }

    /// Evict the oldest connection if it has outlived the grace period.
    pub fn evict_oldest(&self) -> bool {
        self.evict_oldest_at(Instant::now())
    }

    /// [`evict_oldest`](Self::evict_oldest) against an explicit clock reading.
    pub fn evict_oldest_at(&self, now: Instant) -> bool {
        let mut connections = self.entries();
        Self::evict_oldest_locked(&mut connections, self.grace_period, now)
    }

    fn evict_oldest_locked(
        connections: &mut HashMap<ConnectionId, Arc<Connection>>,
        grace_period: Duration,
        now: Instant,
    ) -> bool {
        let Some(oldest) = connections
            .values()
            .min_by_key(|conn| (conn.created(), conn.id()))
            .cloned()
        else {
            return false;
        };

        let age = oldest.age_at(now);
        if age < grace_period {
            tracing::debug!(
                connection_id = %oldest.id(),
                age_ms = age.as_millis() as u64,
                "Oldest connection is within grace period, not evicting"
            );
            return false;
        }

        connections.remove(&oldest.id());
        oldest.mark_closed();
        metrics::record_evicted();
        metrics::record_active_connections(connections.len());
        tracing::info!(
            connection_id = %oldest.id(),
            age_ms = age.as_millis() as u64,
            "Evicted oldest connection to admit a new one"
        );
        true
    }

    /// Close a connection. A no-op if it was already removed.
    ///
    /// Returns whether this call performed the close.
    pub fn close(&self, connection: &Connection) -> bool {
        let remaining = {
            let mut connections = self.entries();
            if connections.remove(&connection.id()).is_none() {
                tracing::trace!(
                    connection_id = %connection.id(),
                    "Connection already closed and removed"
                );
                return false;
            }
            connection.mark_closed();
            connections.len()
        };

        metrics::record_active_connections(remaining);
        tracing::debug!(connection_id = %connection.id(), remaining, "Connection closed");
        true
    }

    /// Close every registered connection (shutdown path).
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.entries().drain().map(|(_, conn)| conn).collect();
        for conn in &drained {
            conn.mark_closed();
        }
        metrics::record_active_connections(0);
        drained.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::testing::connection_pair;

    async fn admitted(registry: &ConnectionRegistry) -> (Arc<Connection>, tokio::net::TcpStream) {
        let (conn, client) = connection_pair().await;
        let conn = Arc::new(conn);
        registry.admit(conn.clone()).unwrap();
        (conn, client)
    }

    #[tokio::test]
    async fn admits_up_to_capacity() {
        let registry = ConnectionRegistry::new(2, DEFAULT_GRACE_PERIOD);
        let (_a, _ca) = admitted(&registry).await;
        let (_b, _cb) = admitted(&registry).await;
        assert_eq!(registry.len(), 2);

        let (c, _cc) = connection_pair().await;
        let err = registry.admit(Arc::new(c)).unwrap_err();
        assert_eq!(err, AdmissionError::ServiceBusy { active: 2, max: 2 });
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn evicts_oldest_only_after_grace_period() {
        let registry = ConnectionRegistry::new(2, DEFAULT_GRACE_PERIOD);
        let (oldest, _ca) = admitted(&registry).await;
        let (newer, _cb) = admitted(&registry).await;

        assert!(!registry.evict_oldest_at(Instant::now()));
        assert_eq!(registry.len(), 2);

        let later = oldest.created() + DEFAULT_GRACE_PERIOD + Duration::from_millis(1);
        assert!(registry.evict_oldest_at(later));
        assert!(oldest.is_closed());
        assert!(!registry.contains(oldest.id()));
        assert!(registry.contains(newer.id()));
        assert!(!newer.is_closed());
    }

    #[tokio::test]
    async fn admit_evicts_when_full_and_stale() {
        let registry = ConnectionRegistry::new(1, Duration::from_millis(20));
        let (stale, _ca) = admitted(&registry).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (fresh, _cb) = connection_pair().await;
        let fresh = Arc::new(fresh);
        registry.admit(fresh.clone()).unwrap();

        assert!(stale.is_closed());
        assert!(registry.contains(fresh.id()));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let registry = ConnectionRegistry::new(4, DEFAULT_GRACE_PERIOD);
        let (conn, _client) = admitted(&registry).await;

        assert!(registry.close(&conn));
        assert!(conn.is_closed());
        assert!(!registry.close(&conn));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_after_eviction_is_noop() {
        let registry = ConnectionRegistry::new(1, Duration::ZERO);
        let (conn, _client) = admitted(&registry).await;

        assert!(registry.evict_oldest());
        assert!(!registry.close(&conn));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn concurrent_close_closes_once() {
        let registry = Arc::new(ConnectionRegistry::new(4, DEFAULT_GRACE_PERIOD));
        let (conn, _client) = admitted(&registry).await;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move { registry.close(&conn) }));
        }
        let mut closed = 0;
        for task in tasks {
            if task.await.unwrap() {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn close_all_cancels_everything() {
        let registry = ConnectionRegistry::new(4, DEFAULT_GRACE_PERIOD);
        let (a, _ca) = admitted(&registry).await;
        let (b, _cb) = admitted(&registry).await;

        assert_eq!(registry.close_all(), 2);
        assert!(a.is_closed() && b.is_closed());
        assert!(registry.is_empty());
    }
}
