//! One-command-per-connection stack protocol.
//!
//! # Data Flow
//! ```text
//! admitted Connection
//!     → handler.rs (decode header via codec.rs, wait if necessary,
//!                   mutate the stack, respond, signal the coordinator)
//!     → connection closed through the registry
//! ```

pub mod codec;
pub mod handler;

pub use codec::{Command, BUSY, MAX_PAYLOAD_LEN, POP_HEADER, PUSH_ACK};
pub use handler::ProtocolHandler;
