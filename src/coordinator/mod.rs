//! Wake/notify coordination between blocked pushers and poppers.
//!
//! # Data Flow
//! ```text
//! handler (stack full)  → wait_for_capacity → push-waiters ─┐
//! handler (stack empty) → wait_for_data     → pop-waiters  ─┤
//!                                                           │
//! pop completed  → on_pop  → dequeue_live(push-waiters) ────┤→ wake exactly one
//! push completed → on_push → dequeue_live(pop-waiters)  ────┘
//! ```
//!
//! # Design Decisions
//! - Each waiter is registered in exactly one list, chosen by why it waits
//! - Strict FIFO among live entries of a list; no ordering across lists
//! - Every registration takes a ticket; a woken waiter that lost its slot to
//!   another task re-queues with its original ticket, ahead of later arrivals
//! - Entries hold a `Weak` reference, so a queued waiter never keeps its
//!   connection alive; closed or dropped connections are skipped on dequeue
//! - An event with no live waiter of the matching kind is a no-op

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::{RecvError, TryRecvError};

use crate::net::Connection;
use crate::observability::metrics;

/// Why a waiter is blocked, which also selects its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// Blocked pushing onto a full stack; released by a pop.
    Capacity,
    /// Blocked popping an empty stack; released by a push.
    Data,
}

impl WaitKind {
    /// The event that releases this kind of waiter.
    pub fn released_by(self) -> StackEvent {
        match self {
            WaitKind::Capacity => StackEvent::Pop,
            WaitKind::Data => StackEvent::Push,
        }
    }

    fn label(self) -> &'static str {
        match self {
            WaitKind::Capacity => "push",
            WaitKind::Data => "pop",
        }
    }
}

/// A completed stack mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEvent {
    Push,
    Pop,
}

impl StackEvent {
    /// The kind of waiter this event releases.
    pub fn wakes(self) -> WaitKind {
        match self {
            StackEvent::Push => WaitKind::Data,
            StackEvent::Pop => WaitKind::Capacity,
        }
    }
}

/// Arrival order of a waiter within its list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

/// The receiving half of a one-shot wake.
#[derive(Debug)]
pub struct WaitSignal {
    ticket: Ticket,
    rx: oneshot::Receiver<()>,
}

impl WaitSignal {
    /// The ticket to re-queue with if the wake is lost to another task.
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Resolve once woken. Fails if the entry was discarded without a wake.
    pub async fn woken(&mut self) -> Result<(), RecvError> {
        (&mut self.rx).await
    }

    pub fn try_recv(&mut self) -> Result<(), TryRecvError> {
        self.rx.try_recv()
    }
}

/// A queued waiter.
#[derive(Debug)]
pub struct WaitEntry {
    ticket: Ticket,
    signal: oneshot::Sender<()>,
    connection: Weak<Connection>,
}

impl WaitEntry {
    fn is_live(&self) -> bool {
        !self.signal.is_closed()
            && self
                .connection
                .upgrade()
                .is_some_and(|conn| !conn.is_closed())
    }

    /// Deliver the wake. Fails if the waiting task has already gone away.
    pub fn wake(self) -> bool {
        self.signal.send(()).is_ok()
    }

    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.upgrade()
    }
}

/// Two FIFO wait-lists plus the event dispatcher.
#[derive(Debug, Default)]
pub struct WaitCoordinator {
    push_waiters: Mutex<VecDeque<WaitEntry>>,
    pop_waiters: Mutex<VecDeque<WaitEntry>>,
    next_ticket: AtomicU64,
}

impl WaitCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, kind: WaitKind) -> MutexGuard<'_, VecDeque<WaitEntry>> {
        let list = match kind {
            WaitKind::Capacity => &self.push_waiters,
            WaitKind::Data => &self.pop_waiters,
        };
        list.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an entry, keeping each list ordered by ticket.
    ///
    /// New tickets are drawn while the list lock is held, so a fresh entry
    /// always belongs at the back.
    fn enqueue(
        &self,
        kind: WaitKind,
        connection: &Arc<Connection>,
        ticket: Option<Ticket>,
    ) -> WaitSignal {
        let (tx, rx) = oneshot::channel();
        let mut list = self.list(kind);
        let ticket =
            ticket.unwrap_or_else(|| Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed)));
        let position = list.partition_point(|entry| entry.ticket < ticket);
        list.insert(
            position,
            WaitEntry {
                ticket,
                signal: tx,
                connection: Arc::downgrade(connection),
            },
        );
        metrics::record_waiters(kind.label(), list.len());
        tracing::debug!(
            connection_id = %connection.id(),
            list = kind.label(),
            position = position + 1,
            "Waiter queued"
        );
        WaitSignal { ticket, rx }
    }

    /// Queue a waiter blocked on a full stack.
    pub fn wait_for_capacity(&self, connection: &Arc<Connection>) -> WaitSignal {
        self.enqueue(WaitKind::Capacity, connection, None)
    }

    /// Queue a waiter blocked on an empty stack.
    pub fn wait_for_data(&self, connection: &Arc<Connection>) -> WaitSignal {
        self.enqueue(WaitKind::Data, connection, None)
    }

    /// Queue a woken waiter again after another task took the freed slot.
    ///
    /// The entry goes back in front of every waiter that arrived after it.
    pub fn requeue(
        &self,
        kind: WaitKind,
        connection: &Arc<Connection>,
        ticket: Ticket,
    ) -> WaitSignal {
        self.enqueue(kind, connection, Some(ticket))
    }

    /// Pop entries off the front of a list until a live one is found.
    pub fn dequeue_live(&self, kind: WaitKind) -> Option<WaitEntry> {
        let mut list = self.list(kind);
        let mut discarded = 0usize;
        let found = loop {
            match list.pop_front() {
                Some(entry) if entry.is_live() => break Some(entry),
                Some(_) => discarded += 1,
                None => break None,
            }
        };
        metrics::record_waiters(kind.label(), list.len());
        if discarded > 0 {
            tracing::debug!(list = kind.label(), discarded, "Discarded dead waiters");
        }
        found
    }

    /// Wake the oldest live waiter of `kind`. Returns whether one was woken.
    fn wake_one(&self, kind: WaitKind) -> bool {
        while let Some(entry) = self.dequeue_live(kind) {
            let id = entry.connection().map(|conn| conn.id());
            if entry.wake() {
                if let Some(id) = id {
                    tracing::debug!(connection_id = %id, list = kind.label(), "Waiter woken");
                }
                return true;
            }
        }
        false
    }

    /// A push completed: release one waiter blocked on an empty stack.
    pub fn on_push(&self) -> bool {
        self.wake_one(WaitKind::Data)
    }

    /// A pop completed: release one waiter blocked on a full stack.
    pub fn on_pop(&self) -> bool {
        self.wake_one(WaitKind::Capacity)
    }

    pub fn dispatch(&self, event: StackEvent) -> bool {
        match event {
            StackEvent::Push => self.on_push(),
            StackEvent::Pop => self.on_pop(),
        }
    }

    /// Number of queued entries, dead ones included.
    pub fn waiting(&self, kind: WaitKind) -> usize {
        self.list(kind).len()
    }
}
