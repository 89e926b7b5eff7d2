use std::io;
use thiserror::Error;

/// Errors surfaced by the relay client and server
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Not connected to the relay")]
    NotConnected,

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Message of {size} bytes does not fit in a {limit}-byte frame")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Send failed: {0}")]
    Send(#[source] io::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}
