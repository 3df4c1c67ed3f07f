//! Per-connection command handling.
//!
//! # Flow
//! ```text
//! read header ─┬─ push(len) → read payload → start monitor → [wait for capacity]
//!              │                → push → ack 0x00 → on_push
//!              └─ pop        → start monitor → [wait for data]
//!                               → pop → framed payload → on_pop
//! always: close through the registry
//! ```
//!
//! The full/empty decision and waiter registration happen under the stack
//! lock, so a waiter is always queued before the mutation that can release it.
//! A woken waiter re-checks under the lock. If another task got there first it
//! queues again with its original ticket, so later arrivals cannot overtake it.
//! Response writes race the closed signal like reads do, so a peer that never
//! reads cannot pin a closed connection.

use std::future::Future;
use std::io;
use std::sync::Arc;

use crate::coordinator::{Ticket, WaitKind, WaitSignal};
use crate::error::ProtocolError;
use crate::net::{Connection, ConnectionMonitor};
use crate::observability::metrics;
use crate::protocol::codec::{encode_pop_response, Command, PUSH_ACK};
use crate::service::StackService;
use crate::stack::Payload;

/// Serves exactly one command on one connection.
pub struct ProtocolHandler {
    service: Arc<StackService>,
    connection: Arc<Connection>,
}

impl ProtocolHandler {
    pub fn new(service: Arc<StackService>, connection: Arc<Connection>) -> Self {
        Self {
            service,
            connection,
        }
    }

    /// Serve the command, then close the connection regardless of outcome.
    pub async fn run(self) {
        match self.serve().await {
            Ok(command) => {
                tracing::debug!(op = command.name(), "Command completed");
            }
            Err(ProtocolError::ConnectionClosed) => {
                tracing::debug!("Connection closed before command completed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Command aborted");
            }
        }
        self.service.registry.close(&self.connection);
    }

    async fn serve(&self) -> Result<Command, ProtocolError> {
        let mut header = [0u8; 1];
        if self.cancellable(self.connection.read_full(&mut header)).await? == 0 {
            return Err(ProtocolError::EmptyHeader);
        }

        let command = Command::decode(header[0]);
        tracing::debug!(op = command.name(), "Received command");

        match command {
            Command::Push { len } => {
                let payload = self.read_payload(len as usize).await?;
                self.start_monitor();
                self.push(payload).await?;
            }
            Command::Pop => {
                self.start_monitor();
                self.pop().await?;
            }
        }
        Ok(command)
    }

    /// Run an I/O step, giving up as soon as the connection is closed.
    async fn cancellable<T>(
        &self,
        op: impl Future<Output = io::Result<T>>,
    ) -> Result<T, ProtocolError> {
        tokio::select! {
            result = op => Ok(result?),
            _ = self.connection.closed() => Err(ProtocolError::ConnectionClosed),
        }
    }

    async fn read_payload(&self, expected: usize) -> Result<Payload, ProtocolError> {
        let mut payload = vec![0u8; expected];
        let received = self
            .cancellable(self.connection.read_full(&mut payload))
            .await?;
        if received < expected {
            return Err(ProtocolError::ShortPayload { expected, received });
        }
        Ok(payload)
    }

    fn start_monitor(&self) {
        ConnectionMonitor::new(
            self.connection.clone(),
            self.service.registry.clone(),
            self.service.probe_interval,
        )
        .spawn();
    }

    async fn push(&self, payload: Payload) -> Result<(), ProtocolError> {
        let len = payload.len();
        let mut ticket = None;
        loop {
            let signal = {
                if self.connection.is_closed() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                let mut stack = self.service.stack.lock();
                if !stack.is_full() {
                    stack.push(payload);
                    tracing::debug!(len, depth = stack.len(), "Pushed payload");
                    break;
                }
                self.queue(WaitKind::Capacity, ticket)
            };
            ticket = Some(signal.ticket());
            self.park(signal, WaitKind::Capacity).await?;
        }
        metrics::record_operation("push");

        // The stack changed, so the event fires even if the ack cannot be sent.
        let acked = self.cancellable(self.connection.write_all(&[PUSH_ACK])).await;
        self.service.coordinator.on_push();
        acked
    }

    async fn pop(&self) -> Result<(), ProtocolError> {
        let mut ticket = None;
        let payload = loop {
            let signal = {
                if self.connection.is_closed() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                let mut stack = self.service.stack.lock();
                if !stack.is_empty() {
                    let payload = stack.pop();
                    tracing::debug!(
                        len = payload.len(),
                        depth = stack.len(),
                        "Popped payload"
                    );
                    break payload;
                }
                self.queue(WaitKind::Data, ticket)
            };
            ticket = Some(signal.ticket());
            self.park(signal, WaitKind::Data).await?;
        };
        metrics::record_operation("pop");

        let sent = self
            .cancellable(self.connection.write_all(&encode_pop_response(&payload)))
            .await;
        self.service.coordinator.on_pop();
        sent
    }

    /// Register as a waiter, keeping the original place after a lost wake.
    fn queue(&self, kind: WaitKind, ticket: Option<Ticket>) -> WaitSignal {
        let coordinator = &self.service.coordinator;
        match (kind, ticket) {
            (kind, Some(ticket)) => coordinator.requeue(kind, &self.connection, ticket),
            (WaitKind::Capacity, None) => coordinator.wait_for_capacity(&self.connection),
            (WaitKind::Data, None) => coordinator.wait_for_data(&self.connection),
        }
    }

    /// Block until woken or until the connection closes.
    ///
    /// A wake that lands on a closed connection is handed to the next waiter.
    async fn park(&self, mut signal: WaitSignal, kind: WaitKind) -> Result<(), ProtocolError> {
        tracing::debug!(?kind, "Waiting");
        tokio::select! {
            woken = signal.woken() => {
                if woken.is_err() {
                    return Err(ProtocolError::ConnectionClosed);
                }
                if self.connection.is_closed() {
                    self.forward_wake(kind);
                    return Err(ProtocolError::ConnectionClosed);
                }
                Ok(())
            }
            _ = self.connection.closed() => {
                if signal.try_recv().is_ok() {
                    self.forward_wake(kind);
                }
                Err(ProtocolError::ConnectionClosed)
            }
        }
    }

    fn forward_wake(&self, kind: WaitKind) {
        tracing::debug!(?kind, "Woken after close, forwarding wake");
        self.service.coordinator.dispatch(kind.released_by());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::net::connection::testing::{connection_pair, fill_send_buffer};
    use std::time::Duration;

    async fn until_waiting(service: &StackService, kind: WaitKind, count: usize) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while service.coordinator.waiting(kind) < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("waiters never queued");
    }

    async fn handler_for(
        service: &Arc<StackService>,
    ) -> (ProtocolHandler, tokio::net::TcpStream) {
        let (conn, client) = connection_pair().await;
        let conn = Arc::new(conn);
        service.registry.admit(conn.clone()).unwrap();
        (ProtocolHandler::new(service.clone(), conn), client)
    }

    #[tokio::test]
    async fn wake_on_closed_connection_is_forwarded() {
        let service = Arc::new(StackService::new(&ServerConfig::default()));
        let (first, _c1) = handler_for(&service).await;
        let (second, _c2) = handler_for(&service).await;

        let first_signal = service.coordinator.wait_for_capacity(&first.connection);
        let mut second_signal = service.coordinator.wait_for_capacity(&second.connection);

        assert!(service.coordinator.on_pop());
        service.registry.close(&first.connection);

        let result = first.park(first_signal, WaitKind::Capacity).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
        assert!(second_signal.try_recv().is_ok());
    }

    #[tokio::test]
    async fn closed_while_parked_returns_promptly() {
        let service = Arc::new(StackService::new(&ServerConfig::default()));
        let (handler, _client) = handler_for(&service).await;
        let signal = service.coordinator.wait_for_data(&handler.connection);

        let registry = service.registry.clone();
        let conn = handler.connection.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry.close(&conn);
        });

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            handler.park(signal, WaitKind::Data),
        )
        .await
        .expect("park should observe the close");
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn woken_pusher_that_loses_its_slot_stays_ahead_of_later_waiters() {
        let mut config = ServerConfig::default();
        config.stack.capacity = 1;
        let service = Arc::new(StackService::new(&config));
        service.stack.lock().push(b"full".to_vec());

        let (early, _early_client) = handler_for(&service).await;
        let (later, _later_client) = handler_for(&service).await;
        let early_task = tokio::spawn(async move { early.push(b"early".to_vec()).await });
        until_waiting(&service, WaitKind::Capacity, 1).await;

        // A pop wakes the early pusher, but a newcomer fills the slot first.
        service.stack.lock().pop();
        assert!(service.coordinator.on_pop());
        service.stack.lock().push(b"newcomer".to_vec());
        let mut later_signal = service.coordinator.wait_for_capacity(&later.connection);

        // The early pusher re-checks, finds the stack full and queues again.
        until_waiting(&service, WaitKind::Capacity, 2).await;

        service.stack.lock().pop();
        assert!(service.coordinator.on_pop());
        let result = tokio::time::timeout(Duration::from_secs(1), early_task)
            .await
            .expect("early pusher should be released first")
            .unwrap();
        assert!(result.is_ok());
        assert!(later_signal.try_recv().is_err());
        assert_eq!(service.stack.lock().pop(), b"early".to_vec());
    }

    #[tokio::test]
    async fn stalled_response_write_gives_up_on_close() {
        let service = Arc::new(StackService::new(&ServerConfig::default()));
        let (handler, _client) = handler_for(&service).await;
        fill_send_buffer(&handler.connection).await;
        service.stack.lock().push(vec![7u8; 127]);

        let registry = service.registry.clone();
        let conn = handler.connection.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            registry.close(&conn);
        });

        let result = tokio::time::timeout(Duration::from_secs(1), handler.pop())
            .await
            .expect("pop should stop writing once closed");
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
        assert_eq!(service.stack.len(), 0);
    }
}
