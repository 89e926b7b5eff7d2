//! Session registry and the command dispatch seam

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Live game session that relayed commands run against
pub trait SessionHandle: Send + Sync + 'static {
    /// Whether the session can still accept commands
    fn is_valid(&self) -> bool;
}

/// Result of a successful dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No command with that name exists
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("command failed: {0}")]
    Failed(String),

    #[error("dispatcher panicked: {0}")]
    Panicked(String),
}

/// Executes `[name, args...]` against a session
pub trait CommandDispatcher<H>: Send + Sync + 'static {
    fn dispatch(&self, argv: &[&str], session: &H) -> Result<DispatchOutcome, DispatchError>;
}

impl<H, F> CommandDispatcher<H> for F
where
    F: Fn(&[&str], &H) -> Result<DispatchOutcome, DispatchError> + Send + Sync + 'static,
{
    fn dispatch(&self, argv: &[&str], session: &H) -> Result<DispatchOutcome, DispatchError> {
        self(argv, session)
    }
}

/// Run a dispatcher, turning a panic into a `DispatchError`
pub fn dispatch_isolated<H, D>(
    dispatcher: &D,
    argv: &[&str],
    session: &H,
) -> Result<DispatchOutcome, DispatchError>
where
    D: CommandDispatcher<H> + ?Sized,
{
    match catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(argv, session))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(DispatchError::Panicked(message))
        }
    }
}

/// Session id → handle. Registering an existing id replaces its handle.
pub struct SessionRegistry<H> {
    sessions: Mutex<HashMap<String, Arc<H>>>,
}

impl<H> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SessionRegistry<H> {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<H>>> {
        // A panicking holder cannot leave the map half-updated
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handle` under `session_id`, returning the handle it replaced
    pub fn register(&self, session_id: impl Into<String>, handle: H) -> Option<Arc<H>> {
        self.lock().insert(session_id.into(), Arc::new(handle))
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<H>> {
        self.lock().get(session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Session handle that is always valid, for the development server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSession {
    pub name: String,
}

impl StaticSession {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl SessionHandle for StaticSession {
    fn is_valid(&self) -> bool {
        true
    }
}

/// Dispatcher that only logs what it receives. Knows `item` and `map`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

impl CommandDispatcher<StaticSession> for LoggingDispatcher {
    fn dispatch(&self, argv: &[&str], session: &StaticSession) -> Result<DispatchOutcome, DispatchError> {
        match argv.first().copied() {
            Some("item") | Some("map") => {
                log::info!("[{}] {}", session.name, argv.join(" "));
                Ok(DispatchOutcome::Handled)
            }
            _ => Ok(DispatchOutcome::NotFound),
        }
    }
}
