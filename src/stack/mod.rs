//! Fixed-capacity LIFO payload storage.
//!
//! # Data Flow
//! ```text
//! ProtocolHandler
//!     → SharedStack::lock() (one exclusive lock for push AND pop)
//!     → BoundedStack::is_full / is_empty (decide: mutate or wait)
//!     → BoundedStack::push / pop
//!     → guard dropped, event dispatched to the WaitCoordinator
//! ```
//!
//! # Design Decisions
//! - `BoundedStack` never blocks and never fails; pushing onto a full stack or
//!   popping an empty one is a caller bug and panics
//! - Push and pop share a single mutex so their mutations never interleave

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::observability::metrics;

/// Default number of payloads the stack holds.
pub const DEFAULT_CAPACITY: usize = 100;

/// An immutable payload as received from a pushing client.
pub type Payload = Vec<u8>;

/// Fixed-capacity LIFO container of opaque byte payloads.
#[derive(Debug)]
pub struct BoundedStack {
    items: Vec<Payload>,
    capacity: usize,
}

impl BoundedStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push a payload.
    ///
    /// # Panics
    /// If the stack is already full.
    pub fn push(&mut self, payload: Payload) {
        assert!(!self.is_full(), "push on a full stack");
        self.items.push(payload);
        metrics::record_stack_depth(self.items.len());
    }

    /// Remove and return the most recently pushed payload.
    ///
    /// # Panics
    /// If the stack is empty.
    pub fn pop(&mut self) -> Payload {
        let payload = self.items.pop().expect("pop on an empty stack");
        metrics::record_stack_depth(self.items.len());
        payload
    }
}

impl Default for BoundedStack {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// The single, process-wide stack guarded by one exclusive lock.
#[derive(Debug, Default)]
pub struct SharedStack {
    inner: Mutex<BoundedStack>,
}

impl SharedStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BoundedStack::new(capacity)),
        }
    }

    /// Acquire exclusive mutation rights.
    ///
    /// Critical sections never leave the stack half-updated, so a poisoned
    /// lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, BoundedStack> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn lifo_order() {
        let mut stack = BoundedStack::new(4);
        stack.push(b"A".to_vec());
        stack.push(b"B".to_vec());
        assert_eq!(stack.pop(), b"B");
        assert_eq!(stack.pop(), b"A");
        assert!(stack.is_empty());
    }

    #[test]
    fn full_at_capacity() {
        let mut stack = BoundedStack::default();
        for i in 0..DEFAULT_CAPACITY {
            assert!(!stack.is_full());
            stack.push(vec![i as u8]);
        }
        assert!(stack.is_full());
        assert_eq!(stack.len(), 100);

        stack.pop();
        assert!(!stack.is_full());
    }

    #[test]
    fn empty_payload_is_a_real_entry() {
        let mut stack = BoundedStack::new(1);
        stack.push(Vec::new());
        assert!(stack.is_full());
        assert_eq!(stack.pop(), Vec::<u8>::new());
    }

    #[test]
    #[should_panic(expected = "push on a full stack")]
    fn push_past_capacity_is_a_bug() {
        let mut stack = BoundedStack::new(1);
        stack.push(vec![1]);
        stack.push(vec![2]);
    }

    #[test]
    #[should_panic(expected = "pop on an empty stack")]
    fn pop_empty_is_a_bug() {
        BoundedStack::new(1).pop();
    }

    #[test]
    fn concurrent_push_pop_never_exceeds_capacity() {
        let shared = Arc::new(SharedStack::new(8));
        let mut threads = Vec::new();

        for t in 0..4u8 {
            let shared = Arc::clone(&shared);
            threads.push(std::thread::spawn(move || {
                for i in 0..1_000u32 {
                    let mut stack = shared.lock();
                    if (i + t as u32) % 2 == 0 && !stack.is_full() {
                        stack.push(vec![t]);
                    } else if !stack.is_empty() {
                        stack.pop();
                    }
                    assert!(stack.len() <= stack.capacity());
                }
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }
        assert!(shared.len() <= 8);
    }
}
