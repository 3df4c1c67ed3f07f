//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define server metrics (admissions, evictions, operations, waiters)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `stack_connections_admitted_total` (counter)
//! - `stack_connections_rejected_total` (counter): busy byte sent
//! - `stack_connections_evicted_total` (counter)
//! - `stack_active_connections` (gauge): registry size
//! - `stack_operations_total` (counter): completed operations by `op`
//! - `stack_depth` (gauge): payloads currently stored
//! - `stack_waiters` (gauge): queued waiters by `list`
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus metrics exporter initialized");
    Ok(())
}

pub fn record_admitted(active: usize) {
    ::metrics::counter!("stack_connections_admitted_total").increment(1);
    record_active_connections(active);
}

pub fn record_rejected() {
    ::metrics::counter!("stack_connections_rejected_total").increment(1);
}

pub fn record_evicted() {
    ::metrics::counter!("stack_connections_evicted_total").increment(1);
}

pub fn record_active_connections(active: usize) {
    ::metrics::gauge!("stack_active_connections").set(active as f64);
}

pub fn record_operation(op: &'static str) {
    ::metrics::counter!("stack_operations_total", "op" => op).increment(1);
}

pub fn record_stack_depth(depth: usize) {
    ::metrics::gauge!("stack_depth").set(depth as f64);
}

pub fn record_waiters(list: &'static str, len: usize) {
    ::metrics::gauge!("stack_waiters", "list" => list).set(len as f64);
}
