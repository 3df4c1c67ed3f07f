//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → connection.rs (id, creation time, closed flag)
//!     → registry.rs (admit / evict oldest / reject with busy byte)
//!     → Hand off to protocol handler
//!     → monitor.rs (watches for peer disconnect while the handler waits)
//!
//! Connection States:
//!     Accepted → Admitted → Closed (handler done | peer gone | evicted | shutdown)
//! ```
//!
//! # Design Decisions
//! - Every close goes through the registry, which makes it idempotent
//! - Closing publishes cancellation, so parked tasks return promptly

pub mod connection;
pub mod listener;
pub mod monitor;
pub mod registry;

pub use connection::{Connection, ConnectionId};
pub use listener::Listener;
pub use monitor::{ConnectionMonitor, MonitorOutcome};
pub use registry::ConnectionRegistry;
