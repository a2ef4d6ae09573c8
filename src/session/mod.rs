//! Per-request sessions and anti-forgery tokens.
//!
//! # Lifecycle
//! ```text
//! request start:  SessionManager::start(cookie)  → Session (loaded or fresh)
//! during request: auth/login/logout mutate the working copy
//! request end:    SessionManager::flush(session) → SessionStore
//! ```
//!
//! The backing store is injected; concurrent requests on the same session
//! are last-write-wins.

mod csrf;
mod manager;
mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use csrf::{CsrfCheck, CsrfGuard, CsrfToken};
pub use manager::SessionManager;
pub use store::{MemorySessionStore, SessionStore};

use crate::crypto::EntropyError;

/// Session backend failures
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Entropy(#[from] EntropyError),
}

/// Snapshot of the logged-in user kept in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub role_id: i64,
    pub role: String,
    pub is_admin: bool,
}

/// Read-only view of the current user handed to controllers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub id: i64,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub role: String,
    #[serde(skip)]
    pub role_id: i64,
    pub is_admin: bool,
}

impl From<&SessionUser> for AuthenticatedUser {
    fn from(user: &SessionUser) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            nom: user.nom.clone(),
            prenom: user.prenom.clone(),
            role: user.role.clone(),
            role_id: user.role_id,
            is_admin: user.is_admin,
        }
    }
}

/// Persisted session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub user: Option<SessionUser>,
    pub csrf: Option<CsrfToken>,
    pub intended_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionData {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            user: None,
            csrf: None,
            intended_url: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// Inactive for longer than `lifetime`
    pub fn is_expired(&self, lifetime: Duration) -> bool {
        (Utc::now() - self.last_activity)
            .to_std()
            .map(|idle| idle > lifetime)
            .unwrap_or(false)
    }
}

impl Default for SessionData {
    fn default() -> Self {
        Self::new()
    }
}

/// Working copy of one session for the duration of a request
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    data: SessionData,
    is_new: bool,
    dirty: bool,
    destroyed: bool,
    replaced_id: Option<String>,
}

impl Session {
    /// Brand new session, not yet persisted
    pub fn fresh(id: String) -> Self {
        Self {
            id,
            data: SessionData::new(),
            is_new: true,
            dirty: true,
            destroyed: false,
            replaced_id: None,
        }
    }

    /// Session loaded from the store
    pub fn resume(id: String, data: SessionData) -> Self {
        Self {
            id,
            data,
            is_new: false,
            dirty: false,
            destroyed: false,
            replaced_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Id this session had before a regeneration in this request
    pub fn replaced_id(&self) -> Option<&str> {
        self.replaced_id.as_deref()
    }

    pub fn user(&self) -> Option<&SessionUser> {
        self.data.user.as_ref()
    }

    pub fn set_user(&mut self, user: SessionUser) {
        self.data.user = Some(user);
        self.dirty = true;
    }

    pub fn clear_user(&mut self) {
        self.data.user = None;
        self.dirty = true;
    }

    /// Refresh `last_activity`
    pub fn touch(&mut self) {
        self.data.last_activity = Utc::now();
        self.dirty = true;
    }

    pub fn set_intended_url(&mut self, url: String) {
        self.data.intended_url = Some(url);
        self.dirty = true;
    }

    /// Read and clear the post-login redirect target
    pub fn take_intended_url(&mut self) -> Option<String> {
        let url = self.data.intended_url.take();
        if url.is_some() {
            self.dirty = true;
        }
        url
    }

    pub(crate) fn csrf(&self) -> Option<&CsrfToken> {
        self.data.csrf.as_ref()
    }

    pub(crate) fn set_csrf(&mut self, token: Option<CsrfToken>) {
        self.data.csrf = token;
        self.dirty = true;
    }

    pub(crate) fn rotate_id(&mut self, new_id: String) {
        let old = std::mem::replace(&mut self.id, new_id);
        // Keep the id the client originally presented so flush removes it
        if self.replaced_id.is_none() && !self.is_new {
            self.replaced_id = Some(old);
        }
        self.dirty = true;
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.data.user = None;
        self.data.csrf = None;
        self.data.intended_url = None;
        self.destroyed = true;
        self.dirty = true;
    }
}
