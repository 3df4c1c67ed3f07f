//! The single shared service instance.
//!
//! Built once at startup and handed by `Arc` to the server loop and every
//! per-connection task. Tests build their own isolated instances.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::coordinator::WaitCoordinator;
use crate::net::ConnectionRegistry;
use crate::stack::SharedStack;

#[derive(Debug)]
pub struct StackService {
    pub stack: SharedStack,
    pub registry: Arc<ConnectionRegistry>,
    pub coordinator: WaitCoordinator,
    pub probe_interval: Duration,
}

impl StackService {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            stack: SharedStack::new(config.stack.capacity),
            registry: Arc::new(ConnectionRegistry::new(
                config.listener.max_connections,
                config.eviction.grace_period(),
            )),
            coordinator: WaitCoordinator::new(),
            probe_interval: config.monitor.probe_interval(),
        }
    }
}
