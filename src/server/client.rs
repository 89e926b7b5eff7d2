//! Outbound connection to a relay endpoint

use crate::server::error::RelayError;
use crate::server::protocol::encode_message;
use crate::utils::RelayConfig;
use std::fmt;
use std::io::Write;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Holds at most one connection to a relay server
pub struct RelayClient {
    stream: Option<TcpStream>,
    state: ConnectionState,
    peer: Option<String>,
    frame_size: usize,
    connect_timeout: Duration,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            stream: None,
            state: ConnectionState::Disconnected,
            peer: None,
            frame_size: config.frame_size,
            connect_timeout: config.connect_timeout(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// `host:port` of the current connection
    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }

    /// Replace the current connection with one to `host:port`.
    ///
    /// The old connection is torn down even when the new attempt fails.
    /// Failures are logged and reflected in the returned state.
    pub fn connect(&mut self, host: &str, port: u16) -> ConnectionState {
        self.disconnect();
        self.state = ConnectionState::Connecting;

        match self.open(host, port) {
            Ok(stream) => {
                log::info!("Connected to relay {}:{}", host, port);
                self.stream = Some(stream);
                self.peer = Some(format!("{}:{}", host, port));
                self.state = ConnectionState::Connected;
            }
            Err(e) => {
                log::warn!("Failed to connect to relay {}:{}: {}", host, port, e);
                self.state = ConnectionState::Disconnected;
            }
        }
        self.state
    }

    fn open(&self, host: &str, port: u16) -> std::io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "host resolved to no addresses")
        }))
    }

    /// Close the connection if there is one
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
            if let Some(peer) = &self.peer {
                log::info!("Disconnected from relay {}", peer);
            }
        }
        self.peer = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Write `<session_id>*<command>` to the relay.
    ///
    /// Fails without I/O when not connected or when the message is invalid.
    /// A write failure drops the connection.
    pub fn send(&mut self, session_id: &str, command: &str) -> Result<(), RelayError> {
        if self.state != ConnectionState::Connected {
            return Err(RelayError::NotConnected);
        }
        let message = encode_message(session_id, command, self.frame_size)?;
        let stream = self.stream.as_mut().ok_or(RelayError::NotConnected)?;

        let written = stream
            .write_all(message.as_bytes())
            .and_then(|_| stream.flush());
        if let Err(e) = written {
            log::warn!("Relay send failed: {}", e);
            self.disconnect();
            return Err(RelayError::Send(e));
        }

        log::debug!("Relayed {}", message);
        Ok(())
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn config() -> RelayConfig {
        RelayConfig {
            connect_timeout_ms: 500,
            ..Default::default()
        }
    }

    #[test]
    fn test_send_writes_exact_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = RelayClient::new(&config());
        assert_eq!(client.connect("127.0.0.1", port), ConnectionState::Connected);
        let (mut accepted, _) = listener.accept().unwrap();

        client.send("42", "/item 1001 1 1").unwrap();
        client.disconnect();

        let mut received = String::new();
        accepted.read_to_string(&mut received).unwrap();
        assert_eq!(received, "42*/item 1001 1 1");
    }

    #[test]
    fn test_send_when_disconnected() {
        let mut client = RelayClient::new(&config());
        assert!(matches!(client.send("42", "/item 1 1 1"), Err(RelayError::NotConnected)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_failure_is_state_only() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();

        let mut client = RelayClient::new(&config());
        assert_eq!(client.connect("127.0.0.1", port), ConnectionState::Disconnected);
        assert!(client.peer().is_none());
    }

    #[test]
    fn test_reconnect_tears_down_previous() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = RelayClient::new(&config());
        client.connect("127.0.0.1", port);
        let (mut first, _) = listener.accept().unwrap();

        client.connect("127.0.0.1", port);
        assert!(client.is_connected());

        // Old connection sees EOF
        let mut buf = [0u8; 8];
        assert_eq!(first.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut client = RelayClient::new(&config());
        client.disconnect();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_invalid_message_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = RelayClient::new(&config());
        client.connect("127.0.0.1", port);
        let _accepted = listener.accept().unwrap();

        assert!(matches!(client.send("1", "/say *"), Err(RelayError::InvalidCommand(_))));
        let long = format!("/say {}", "x".repeat(200));
        assert!(matches!(client.send("1", &long), Err(RelayError::MessageTooLarge { .. })));
        assert!(client.is_connected());
    }

    #[test]
    fn test_write_failure_disconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut client = RelayClient::new(&config());
        assert_eq!(client.connect("127.0.0.1", port), ConnectionState::Connected);
        let (accepted, _) = listener.accept().unwrap();
        drop(accepted);
        drop(listener);

        // The first writes may still land in the kernel buffer before the reset
        let mut result = Ok(());
        for _ in 0..100 {
            result = client.send("42", "/item 1001 1 1");
            if result.is_err() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert!(matches!(result, Err(RelayError::Send(_))));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.peer().is_none());
        assert!(matches!(client.send("42", "/item 1001 1 1"), Err(RelayError::NotConnected)));
    }
}
