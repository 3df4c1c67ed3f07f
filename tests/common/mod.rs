//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use stack_server::config::ServerConfig;
use stack_server::net::Listener;
use stack_server::{Shutdown, StackServer, StackService};

/// A server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub service: Arc<StackService>,
    pub shutdown: Shutdown,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server with the given configuration on 127.0.0.1:0.
pub async fn start_server(config: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let service = Arc::new(StackService::new(&config));
    let shutdown = Shutdown::new();
    let server = StackServer::with_service(service.clone());
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(Listener::from_tcp(listener), server_shutdown).await;
    });

    TestServer {
        addr,
        service,
        shutdown,
    }
}

/// Config with a small stack for blocking tests.
#[allow(dead_code)]
pub fn config_with_capacity(capacity: usize) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.stack.capacity = capacity;
    config
}

/// Poll `condition` until it holds, panicking after two seconds.
#[allow(dead_code)]
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
