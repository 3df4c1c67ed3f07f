//! Networked bounded LIFO stack server.
//!
//! Clients connect over TCP, send one command (push a payload or pop one),
//! block until it can proceed, receive a response, and are disconnected.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod server;
pub mod service;
pub mod stack;

pub use client::StackClient;
pub use config::ServerConfig;
pub use lifecycle::Shutdown;
pub use server::StackServer;
pub use service::StackService;
