//! Connection handle shared between a handler, its monitor and the registry.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Record the creation time used by age-based eviction
//! - Publish the closed flag and a cancellation signal to every holder
//! - Byte-level I/O through `&self`, so the handler and monitor can share one socket
//!
//! The socket itself is released when the last `Arc<Connection>` is dropped.
//! Closing flips the flag and wakes every task parked in [`Connection::closed`],
//! which makes those tasks return and drop their references.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::sync::watch;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of a single disconnect probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Peer closed its side of the stream.
    Eof,
    /// A stray byte arrived and was discarded.
    Data,
    /// Readiness was spurious; nothing to read.
    Idle,
}

/// One accepted client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    created: Instant,
    closed: AtomicBool,
    cancel: watch::Sender<bool>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            id: ConnectionId::new(),
            stream,
            peer_addr,
            created: Instant::now(),
            closed: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// Age of the connection relative to `now`.
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Set the closed flag and publish cancellation.
    ///
    /// Returns `true` only for the call that actually closed the connection.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.send_replace(true);
        true
    }

    /// Resolves once the connection has been closed through any path.
    pub async fn closed(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Read until `buf` is full or the peer closes. Returns bytes read.
    pub async fn read_full(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            self.stream.readable().await?;
            match self.stream.try_read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    /// Write the whole buffer.
    pub async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.stream.writable().await?;
            match self.stream.try_write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Wait for read readiness, then attempt a non-blocking 1-byte read.
    pub async fn probe(&self) -> io::Result<Probe> {
        self.stream.readable().await?;
        let mut byte = [0u8; 1];
        match self.stream.try_read(&mut byte) {
            Ok(0) => Ok(Probe::Eof),
            Ok(_) => Ok(Probe::Data),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Probe::Idle),
            Err(e) => Err(e),
        }
    }
}
