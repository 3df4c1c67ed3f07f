//! Error taxonomy for the stack server.
//!
//! Per-connection errors (`AdmissionError`, `ProtocolError`) are contained to
//! the connection that raised them; only `ServerError` ever reaches `main`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::net::listener::ListenerError;

/// Admission control failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// Every slot is taken and no connection is old enough to evict.
    #[error("service busy: {active}/{max} connections open, none evictable")]
    ServiceBusy { active: usize, max: usize },
}

/// Failures while serving a single command.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed before sending a header byte.
    #[error("connection closed before header")]
    EmptyHeader,

    #[error("short payload: expected {expected} bytes, received {received}")]
    ShortPayload { expected: usize, received: usize },

    /// The connection was closed by the monitor, an eviction, or shutdown.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Fatal or loop-level server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}
