//! Session backing stores.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::{SessionData, SessionError};

/// Storage for session state, keyed by session id.
///
/// The pipeline loads a session at request start and saves it at request
/// end; implementations only need per-key atomicity.
pub trait SessionStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError>;

    fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError>;

    fn destroy(&self, id: &str) -> Result<(), SessionError>;

    /// Remove sessions idle for longer than `lifetime`; returns how many
    fn prune_expired(&self, lifetime: Duration) -> Result<usize, SessionError>;
}

/// Thread-safe in-memory session storage.
///
/// Sessions are lost when the process restarts.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<DashMap<String, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Current number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &str) -> Result<Option<SessionData>, SessionError> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    fn save(&self, id: &str, data: &SessionData) -> Result<(), SessionError> {
        self.sessions.insert(id.to_string(), data.clone());
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.remove(id);
        Ok(())
    }

    fn prune_expired(&self, lifetime: Duration) -> Result<usize, SessionError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, data| !data.is_expired(lifetime));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
