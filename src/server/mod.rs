//! Command relay over TCP
//!
//! A client sends `<sessionId>*<command>` frames; the server resolves the
//! session and hands the parsed command to an embedding dispatcher.
//!
//! Architecture:
//! - [`RelayClient`]: single outbound connection with explicit state
//! - [`RelayServer`]: accept thread plus one reader thread per connection
//! - [`SessionRegistry`] / [`CommandDispatcher`]: seams to the game server

pub mod client;
pub mod daemon;
pub mod error;
pub mod protocol;
pub mod session;

pub use client::{ConnectionState, RelayClient};
pub use daemon::{RelayServer, ServerStatus};
pub use error::RelayError;
pub use protocol::{item_command, map_command};
pub use session::{
    CommandDispatcher, DispatchError, DispatchOutcome, LoggingDispatcher, SessionHandle,
    SessionRegistry, StaticSession,
};
