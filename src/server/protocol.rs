//! Wire format of the command relay
//!
//! A message is plain text, `<sessionId>*<command>`, sent without any
//! delimiter. The receiver reads fixed-size frames and treats each read as
//! one message, so a message must fit in a single frame.

use crate::server::error::RelayError;
use std::io::{self, ErrorKind, Read};
use thiserror::Error;

/// Separates the session id from the command text
pub const SESSION_SEPARATOR: char = '*';

/// Every command text starts with this
pub const COMMAND_PREFIX: char = '/';

/// Frame size used when none is configured
pub const DEFAULT_FRAME_SIZE: usize = 100;

/// Spawn one unit of an item
pub fn item_command(id: &str) -> String {
    format!("/item {} 1 1", id)
}

/// Warp to a map instance
pub fn map_command(id: &str, instance: &str) -> String {
    format!("/map {} {}", id, instance)
}

/// Build the wire text for `command` addressed to `session_id`.
///
/// Rejects ids or commands that would make the frame ambiguous and messages
/// that do not fit in `frame_size` bytes.
pub fn encode_message(session_id: &str, command: &str, frame_size: usize) -> Result<String, RelayError> {
    if session_id.contains(SESSION_SEPARATOR) {
        return Err(RelayError::InvalidCommand(format!(
            "session id must not contain '{}'",
            SESSION_SEPARATOR
        )));
    }
    if command.contains(SESSION_SEPARATOR) {
        return Err(RelayError::InvalidCommand(format!(
            "command must not contain '{}'",
            SESSION_SEPARATOR
        )));
    }

    let message = format!("{}{}{}", session_id, SESSION_SEPARATOR, command);
    if message.len() > frame_size {
        return Err(RelayError::MessageTooLarge {
            size: message.len(),
            limit: frame_size,
        });
    }
    Ok(message)
}

/// A command name and its arguments, as split from the command text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandInvocation {
    /// Split text after the leading `/` on single spaces; empty fields are kept
    pub fn parse(body: &str) -> Self {
        let mut parts = body.split(' ').map(str::to_string);
        let name = parts.next().unwrap_or_default();
        Self {
            name,
            args: parts.collect(),
        }
    }

    /// `[name, args...]`
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.name.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

/// A decoded relay frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub session_id: String,
    pub command: CommandInvocation,
}

/// Why a frame was not a relay message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("expected exactly one '*' separator, found {0}")]
    Separators(usize),

    #[error("command does not start with '/'")]
    MissingPrefix,
}

/// Decode one received frame.
///
/// Trailing NUL padding and line endings are ignored so that line-based
/// senders interoperate.
pub fn decode_frame(frame: &[u8]) -> Result<RelayMessage, DecodeError> {
    let end = frame
        .iter()
        .rposition(|&b| !matches!(b, 0 | b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    let frame = &frame[..end];

    let separators = memchr::memchr_iter(SESSION_SEPARATOR as u8, frame).count();
    if separators != 1 {
        return Err(DecodeError::Separators(separators));
    }

    let text = String::from_utf8_lossy(frame);
    let (session_id, body) = text
        .split_once(SESSION_SEPARATOR)
        .ok_or(DecodeError::Separators(0))?;
    let body = body
        .strip_prefix(COMMAND_PREFIX)
        .ok_or(DecodeError::MissingPrefix)?;

    Ok(RelayMessage {
        session_id: session_id.to_string(),
        command: CommandInvocation::parse(body),
    })
}

/// Outcome of one frame read
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Bytes received in a single read
    Data(&'a [u8]),
    /// Nothing arrived within the read timeout; the connection is still open
    Idle,
    /// The peer closed the connection
    Closed,
}

/// Source of relay frames
pub trait FrameReader {
    fn read_frame(&mut self) -> io::Result<Frame<'_>>;
}

/// Reads at most `frame_size` bytes per call from the underlying stream
pub struct FixedFrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: Read> FixedFrameReader<R> {
    pub fn new(inner: R, frame_size: usize) -> Self {
        Self {
            inner,
            buf: vec![0u8; frame_size.max(1)],
        }
    }

    pub fn frame_size(&self) -> usize {
        self.buf.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> FrameReader for FixedFrameReader<R> {
    fn read_frame(&mut self) -> io::Result<Frame<'_>> {
        match self.inner.read(&mut self.buf) {
            Ok(0) => Ok(Frame::Closed),
            Ok(n) => Ok(Frame::Data(&self.buf[..n])),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(Frame::Idle)
            }
            Err(e) => Err(e),
        }
    }
}
