//! TCP relay server
//!
//! One accept thread plus one reader thread per connection. The accept loop
//! runs on a non-blocking listener and readers use a read timeout, so every
//! thread polls the shutdown flag at least once per poll interval.

use crate::server::error::RelayError;
use crate::server::protocol::{FixedFrameReader, Frame, FrameReader, decode_frame};
use crate::server::session::{
    CommandDispatcher, DispatchOutcome, SessionHandle, SessionRegistry, dispatch_isolated,
};
use crate::utils::RelayConfig;
use serde::{Deserialize, Serialize};
use std::io::{self, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Counters for the lifetime of a server
struct ServerStats {
    start_time: Instant,
    connections_accepted: AtomicU64,
    connections_rejected: AtomicU64,
    frames_read: AtomicU64,
    commands_dispatched: AtomicU64,
    messages_dropped: AtomicU64,
    dispatch_failures: AtomicU64,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            frames_read: AtomicU64::new(0),
            commands_dispatched: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of server statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub uptime_secs: u64,
    pub active_connections: usize,
    pub sessions: usize,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub frames_read: u64,
    pub commands_dispatched: u64,
    /// Malformed frames and frames for unknown or invalid sessions
    pub messages_dropped: u64,
    /// Dispatcher errors, panics and unknown commands
    pub dispatch_failures: u64,
}

/// A live reader and the socket it owns
struct Connection {
    peer: SocketAddr,
    /// Clone of the reader's socket, used to force it closed
    stream: TcpStream,
    handle: JoinHandle<()>,
}

struct Shared<H> {
    registry: SessionRegistry<H>,
    dispatcher: Box<dyn CommandDispatcher<H>>,
    stats: ServerStats,
    shutdown: AtomicBool,
    connections: Mutex<Vec<Connection>>,
    frame_size: usize,
    poll_interval: Duration,
    max_connections: usize,
}

impl<H: SessionHandle> Shared<H> {
    fn connections(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.connections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        while !self.is_shutting_down() {
            match listener.accept() {
                Ok((stream, peer)) => Arc::clone(&self).admit(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(self.poll_interval),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    log::warn!("Relay accept error: {}", e);
                    thread::sleep(self.poll_interval);
                }
            }
        }
        log::debug!("Relay accept loop stopped");
    }

    /// Start a reader for `stream`, or close it when at capacity
    fn admit(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let mut connections = self.connections();
        connections.retain(|c| !c.handle.is_finished());

        if connections.len() >= self.max_connections {
            ServerStats::bump(&self.stats.connections_rejected);
            log::warn!(
                "Rejecting relay connection from {}: {} connections open",
                peer,
                connections.len()
            );
            let _ = stream.shutdown(Shutdown::Both);
            return;
        }

        if let Err(e) = prepare_stream(&stream, self.poll_interval) {
            log::warn!("Failed to configure connection from {}: {}", peer, e);
            return;
        }
        let control = match stream.try_clone() {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Failed to clone connection from {}: {}", peer, e);
                return;
            }
        };

        let shared = Arc::clone(&self);
        let spawned = thread::Builder::new()
            .name(format!("relay-{}", peer))
            .spawn(move || shared.serve_connection(stream, peer));

        match spawned {
            Ok(handle) => {
                ServerStats::bump(&self.stats.connections_accepted);
                log::debug!("Accepted relay connection from {}", peer);
                connections.push(Connection {
                    peer,
                    stream: control,
                    handle,
                });
            }
            Err(e) => log::warn!("Failed to spawn reader for {}: {}", peer, e),
        }
    }

    fn serve_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let mut reader = FixedFrameReader::new(stream, self.frame_size);

        while !self.is_shutting_down() {
            match reader.read_frame() {
                Ok(Frame::Data(bytes)) => {
                    ServerStats::bump(&self.stats.frames_read);
                    if self.is_shutting_down() {
                        ServerStats::bump(&self.stats.messages_dropped);
                        log::debug!("Dropping frame from {} received during shutdown", peer);
                        break;
                    }
                    self.handle_frame(bytes, peer);
                }
                Ok(Frame::Idle) => {}
                Ok(Frame::Closed) => {
                    log::debug!("Relay connection from {} closed", peer);
                    break;
                }
                Err(e) => {
                    log::debug!("Relay connection from {} failed: {}", peer, e);
                    break;
                }
            }
        }

        // Close the socket before the stream is dropped
        let stream = reader.into_inner();
        let _ = stream.shutdown(Shutdown::Both);
    }

    fn handle_frame(&self, bytes: &[u8], peer: SocketAddr) {
        let message = match decode_frame(bytes) {
            Ok(message) => message,
            Err(e) => {
                ServerStats::bump(&self.stats.messages_dropped);
                log::trace!("Dropping frame from {}: {}", peer, e);
                return;
            }
        };

        let Some(session) = self.registry.get(&message.session_id) else {
            ServerStats::bump(&self.stats.messages_dropped);
            log::warn!("Session {} not found", message.session_id);
            return;
        };
        if !session.is_valid() {
            ServerStats::bump(&self.stats.messages_dropped);
            log::warn!("Session {} is no longer valid", message.session_id);
            return;
        }

        let argv = message.command.argv();
        match dispatch_isolated(self.dispatcher.as_ref(), &argv, session.as_ref()) {
            Ok(DispatchOutcome::Handled) => {
                ServerStats::bump(&self.stats.commands_dispatched);
                log::debug!("Dispatched /{} for session {}", argv.join(" "), message.session_id);
            }
            Ok(DispatchOutcome::NotFound) => {
                ServerStats::bump(&self.stats.dispatch_failures);
                log::warn!("Command /{} not found", message.command.name);
            }
            Err(e) => {
                ServerStats::bump(&self.stats.dispatch_failures);
                log::warn!("Command /{} failed: {}", message.command.name, e);
            }
        }
    }
}

fn prepare_stream(stream: &TcpStream, poll_interval: Duration) -> io::Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(poll_interval))?;
    set_linger_zero(stream)
}

/// Drop unsent data and reset on close instead of lingering in TIME_WAIT
#[cfg(unix)]
fn set_linger_zero(stream: &TcpStream) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };
    let ret = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &linger as *const libc::linger as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn set_linger_zero(_stream: &TcpStream) -> io::Result<()> {
    Ok(())
}

/// A running relay server.
///
/// Dropping it shuts it down.
pub struct RelayServer<H: SessionHandle> {
    shared: Arc<Shared<H>>,
    local_addr: SocketAddr,
    stop_timeout: Duration,
    accept_thread: Option<JoinHandle<()>>,
}

impl<H: SessionHandle> RelayServer<H> {
    /// Bind `config.host:config.port` and start accepting connections
    pub fn start<D>(config: &RelayConfig, dispatcher: D) -> Result<Self, RelayError>
    where
        D: CommandDispatcher<H>,
    {
        let addr = format!("{}:{}", config.host, config.port);
        let bind_err = |source| RelayError::Bind {
            addr: addr.clone(),
            source,
        };

        let listener = TcpListener::bind((config.host.as_str(), config.port)).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        let shared = Arc::new(Shared {
            registry: SessionRegistry::new(),
            dispatcher: Box::new(dispatcher),
            stats: ServerStats::new(),
            shutdown: AtomicBool::new(false),
            connections: Mutex::new(Vec::new()),
            frame_size: config.frame_size,
            poll_interval: config.poll_interval(),
            max_connections: config.max_connections.max(1),
        });

        let accept_shared = Arc::clone(&shared);
        let accept_thread = thread::Builder::new()
            .name("relay-accept".to_string())
            .spawn(move || accept_shared.accept_loop(listener))
            .map_err(bind_err)?;

        log::info!("Relay server listening on {}", local_addr);

        Ok(Self {
            shared,
            local_addr,
            stop_timeout: config.stop_timeout(),
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Register a session; an existing id is replaced
    pub fn register_session(&self, session_id: impl Into<String>, handle: H) {
        let session_id = session_id.into();
        if self.shared.registry.register(session_id.clone(), handle).is_some() {
            log::debug!("Session {} re-registered", session_id);
        }
    }

    pub fn registry(&self) -> &SessionRegistry<H> {
        &self.shared.registry
    }

    pub fn active_connections(&self) -> usize {
        self.shared
            .connections()
            .iter()
            .filter(|c| !c.handle.is_finished())
            .count()
    }

    pub fn status(&self) -> ServerStatus {
        let stats = &self.shared.stats;
        ServerStatus {
            uptime_secs: stats.start_time.elapsed().as_secs(),
            active_connections: self.active_connections(),
            sessions: self.shared.registry.len(),
            connections_accepted: stats.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: stats.connections_rejected.load(Ordering::Relaxed),
            frames_read: stats.frames_read.load(Ordering::Relaxed),
            commands_dispatched: stats.commands_dispatched.load(Ordering::Relaxed),
            messages_dropped: stats.messages_dropped.load(Ordering::Relaxed),
            dispatch_failures: stats.dispatch_failures.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting, wait for readers up to the stop timeout, then force
    /// the remaining sockets closed. Returns once every thread has exited.
    ///
    /// A reader inside a dispatch call is still joined, so the worst case is
    /// the stop timeout plus the longest dispatch in flight.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(accept_thread) = self.accept_thread.take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::Relaxed);
        let _ = accept_thread.join();

        let connections = std::mem::take(&mut *self.shared.connections());
        let deadline = Instant::now() + self.stop_timeout;
        let pause = self.shared.poll_interval.min(Duration::from_millis(10));

        for connection in connections {
            while !connection.handle.is_finished() && Instant::now() < deadline {
                thread::sleep(pause);
            }
            if !connection.handle.is_finished() {
                log::warn!("Forcing relay connection from {} closed", connection.peer);
                let _ = connection.stream.shutdown(Shutdown::Both);
            }
            let _ = connection.handle.join();
        }

        log::info!("Relay server on {} stopped", self.local_addr);
    }
}

impl<H: SessionHandle> Drop for RelayServer<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::session::{DispatchError, StaticSession};
    use std::io::Write;

    fn config() -> RelayConfig {
        RelayConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            poll_interval_ms: 10,
            stop_timeout_ms: 500,
            ..Default::default()
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn noop(_: &[&str], _: &StaticSession) -> Result<DispatchOutcome, DispatchError> {
        Ok(DispatchOutcome::Handled)
    }

    #[test]
    fn test_bind_reports_address() {
        let server = RelayServer::<StaticSession>::start(&config(), noop).unwrap();
        assert_ne!(server.local_addr().port(), 0);
        server.shutdown();
    }

    #[test]
    fn test_bind_conflict() {
        let server = RelayServer::<StaticSession>::start(&config(), noop).unwrap();
        let taken = RelayConfig {
            port: server.local_addr().port(),
            ..config()
        };
        assert!(matches!(
            RelayServer::<StaticSession>::start(&taken, noop),
            Err(RelayError::Bind { .. })
        ));
    }

    #[test]
    fn test_counts_dropped_frames() {
        let server = RelayServer::<StaticSession>::start(&config(), noop).unwrap();
        server.register_session("42", StaticSession::new("hero"));

        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        stream.write_all(b"42*item 1001").unwrap();
        assert!(wait_for(|| server.status().messages_dropped == 1));
        stream.write_all(b"7*/item 1001 1 1").unwrap();
        assert!(wait_for(|| server.status().messages_dropped == 2));
        assert_eq!(server.status().commands_dispatched, 0);
    }

    #[test]
    fn test_rejects_over_capacity() {
        let config = RelayConfig {
            max_connections: 1,
            ..config()
        };
        let server = RelayServer::<StaticSession>::start(&config, noop).unwrap();

        let _first = TcpStream::connect(server.local_addr()).unwrap();
        assert!(wait_for(|| server.active_connections() == 1));
        let _second = TcpStream::connect(server.local_addr()).unwrap();

        assert!(wait_for(|| server.status().connections_rejected == 1));
        assert_eq!(server.active_connections(), 1);
    }

    #[test]
    fn test_reader_ends_on_eof() {
        let server = RelayServer::<StaticSession>::start(&config(), noop).unwrap();

        let stream = TcpStream::connect(server.local_addr()).unwrap();
        assert!(wait_for(|| server.active_connections() == 1));
        drop(stream);
        assert!(wait_for(|| server.active_connections() == 0));
    }

    #[test]
    fn test_shutdown_waits_for_inflight_dispatch() {
        let entered = Arc::new(AtomicBool::new(false));
        let dispatched = Arc::new(AtomicU64::new(0));
        let (entered_flag, dispatch_count) = (Arc::clone(&entered), Arc::clone(&dispatched));
        let dispatcher = move |argv: &[&str], _: &StaticSession| -> Result<DispatchOutcome, DispatchError> {
            if argv[0] == "slow" {
                entered_flag.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(300));
            }
            dispatch_count.fetch_add(1, Ordering::SeqCst);
            Ok(DispatchOutcome::Handled)
        };
        let config = RelayConfig {
            stop_timeout_ms: 100,
            ..config()
        };
        let server = RelayServer::<StaticSession>::start(&config, dispatcher).unwrap();
        server.register_session("42", StaticSession::new("hero"));

        let mut stream = TcpStream::connect(server.local_addr()).unwrap();
        stream.write_all(b"42*/slow").unwrap();
        assert!(wait_for(|| entered.load(Ordering::SeqCst)));
        // Queued behind the slow dispatch; must not run once stop is requested
        stream.write_all(b"42*/item 1 1 1").unwrap();

        let start = Instant::now();
        server.shutdown();
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_is_bounded() {
        let server = RelayServer::<StaticSession>::start(&config(), noop).unwrap();
        let clients: Vec<TcpStream> = (0..4)
            .map(|_| TcpStream::connect(server.local_addr()).unwrap())
            .collect();
        assert!(wait_for(|| server.active_connections() == 4));

        let start = Instant::now();
        server.shutdown();
        assert!(start.elapsed() < Duration::from_secs(2));
        drop(clients);
    }
}
