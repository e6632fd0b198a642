//! Registry of active sessions.
//!
//! The `SessionRegistry` tracks every running session by id:
//! - Spawns each session's retry loop on its own task
//! - Rejects duplicate ids
//! - Hands out snapshots, never live iteration
//! - Stops all sessions and waits for their loops on shutdown

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{Session, SessionEntry, SessionOutcome};
use crate::{Error, Result};

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionHandle {
    entry: SessionEntry,
    cancellation_token: CancellationToken,
    task: Mutex<Option<JoinHandle<SessionOutcome>>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.entry.id
    }

    pub fn entry(&self) -> &SessionEntry {
        &self.entry
    }

    /// Ask the session to stop. Returns immediately.
    pub fn stop(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Whether the session task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.lock().as_ref().is_none_or(|task| task.is_finished())
    }

    fn take_task(&self) -> Option<JoinHandle<SessionOutcome>> {
        self.task.lock().take()
    }
}

/// Registry for tracking and stopping sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session and spawn its retry loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add(&self, session: Session) -> std::result::Result<Arc<SessionHandle>, RegistryError> {
        let id = session.id().to_string();

        let slot = match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => return Err(RegistryError::SessionExists(id)),
            Entry::Vacant(slot) => slot,
        };

        info!(session_id = %id, "Spawning session");
        let handle = Arc::new(SessionHandle {
            entry: session.entry().clone(),
            cancellation_token: session.cancellation_token(),
            task: Mutex::new(None),
        });
        slot.insert(handle.clone());

        *handle.task.lock() = Some(tokio::spawn(session.run()));
        Ok(handle)
    }

    /// Remove a session from the registry without stopping it.
    pub fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let removed = self.sessions.remove(id).map(|(_, handle)| handle);
        if removed.is_some() {
            debug!(session_id = %id, "Removed session from registry");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Result<Arc<SessionHandle>> {
        self.sessions
            .get(id)
            .map(|handle| handle.value().clone())
            .ok_or_else(|| Error::not_found("session", id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Snapshot of all registered sessions.
    pub fn all(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .map(|handle| handle.value().clone())
            .collect()
    }

    /// Entries of all registered sessions, ordered by id.
    pub fn entries(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<_> = self
            .sessions
            .iter()
            .map(|handle| handle.entry().clone())
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Request a single session to stop.
    pub fn stop(&self, id: &str) -> std::result::Result<(), RegistryError> {
        let handle = self
            .sessions
            .get(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))?;
        info!(session_id = %id, "Stopping session");
        handle.stop();
        Ok(())
    }

    /// Stop every session and wait for their loops to exit.
    ///
    /// Loops still running after `timeout` are aborted; their processes are
    /// killed when the aborted task drops them. Sessions stay registered so
    /// the consumer can still observe their terminal events.
    pub async fn stop_all(&self, timeout: Duration) -> Vec<SessionOutcome> {
        let handles = self.all();
        if handles.is_empty() {
            return Vec::new();
        }

        info!("Stopping all {} sessions", handles.len());
        for handle in &handles {
            handle.stop();
        }

        let tasks: Vec<_> = handles.iter().filter_map(|h| h.take_task()).collect();
        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();

        let results = match tokio::time::timeout(timeout, futures::future::join_all(tasks)).await
        {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Sessions did not stop in time, aborting"
                );
                for abort in &aborts {
                    abort.abort();
                }
                return Vec::new();
            }
        };

        results
            .into_iter()
            .filter_map(|result| match result {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!(error = %e, "Session task ended abnormally");
                    None
                }
            })
            .collect()
    }
}

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A session with the given id already exists.
    SessionExists(String),
    /// The session was not found.
    SessionNotFound(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::SessionExists(id) => write!(f, "Session already exists: {}", id),
            RegistryError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
