//! Async client for the stack protocol.
//!
//! Each call opens a fresh connection, since the server serves exactly one
//! command per connection.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::protocol::codec::{decode_pop_response, Command, BUSY, MAX_PAYLOAD_LEN, PUSH_ACK};

/// Errors surfaced to client callers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server refused the connection with the busy byte.
    #[error("server busy")]
    Busy,

    #[error("payload of {0} bytes exceeds the {max}-byte limit", max = MAX_PAYLOAD_LEN)]
    PayloadTooLarge(usize),

    #[error("unexpected push acknowledgement byte {0:#04x}")]
    UnexpectedAck(u8),

    /// The server closed without answering.
    #[error("connection closed without a response")]
    NoResponse,

    #[error("malformed pop response")]
    MalformedResponse,
}

/// Client for a stack server at a fixed address.
#[derive(Debug, Clone)]
pub struct StackClient {
    addr: SocketAddr,
}

impl StackClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Push a payload, waiting for the server's acknowledgement.
    ///
    /// Blocks for as long as the server's stack stays full.
    pub async fn push(&self, payload: &[u8]) -> Result<(), ClientError> {
        let command =
            Command::push_for(payload).ok_or(ClientError::PayloadTooLarge(payload.len()))?;

        let mut stream = TcpStream::connect(self.addr).await?;
        let mut request = Vec::with_capacity(payload.len() + 1);
        request.push(command.encode());
        request.extend_from_slice(payload);
        stream.write_all(&request).await?;

        let mut ack = [0u8; 1];
        match stream.read(&mut ack).await? {
            0 => Err(ClientError::NoResponse),
            _ if ack[0] == PUSH_ACK => Ok(()),
            _ if ack[0] == BUSY => Err(ClientError::Busy),
            _ => Err(ClientError::UnexpectedAck(ack[0])),
        }
    }

    /// Pop a payload, waiting while the server's stack is empty.
    ///
    /// A lone `0xFF` is indistinguishable on the wire between a busy refusal
    /// and a popped one-byte payload `[0xFF]`; it is returned as a payload.
    pub async fn pop(&self) -> Result<Vec<u8>, ClientError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(&[Command::Pop.encode()]).await?;

        let mut frame = Vec::new();
        stream.read_to_end(&mut frame).await?;

        decode_pop_response(&frame)
            .map(<[u8]>::to_vec)
            .ok_or(ClientError::MalformedResponse)
    }
}
