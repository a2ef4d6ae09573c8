//! Session lifecycle around a request.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{Session, SessionError, SessionStore};
use crate::config::Config;
use crate::crypto::{is_token_format, random_token};

/// Starts, flushes and rotates sessions against an injected store
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    cookie_name: String,
    cookie_secure: bool,
    lifetime: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: &Config) -> Self {
        Self {
            store,
            cookie_name: config.session_cookie_name.clone(),
            cookie_secure: config.session_cookie_secure,
            lifetime: config.session_lifetime,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Resume the session named by the cookie, or start a fresh one.
    ///
    /// Ids we did not issue are never adopted.
    pub fn start(&self, cookie: Option<&str>) -> Result<Session, SessionError> {
        if let Some(id) = cookie.filter(|id| is_token_format(id)) {
            if let Some(data) = self.store.load(id)? {
                if !data.is_expired(self.lifetime) {
                    return Ok(Session::resume(id.to_string(), data));
                }
                debug!("Expired session discarded");
                self.store.destroy(id)?;
            }
        }
        Ok(Session::fresh(random_token()?))
    }

    /// Persist the working copy at request end
    pub fn flush(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(old) = session.replaced_id() {
            self.store.destroy(old)?;
        }
        if session.is_destroyed() {
            return self.store.destroy(session.id());
        }
        if session.is_dirty() {
            self.store.save(session.id(), session.data())?;
        }
        Ok(())
    }

    /// Issue a new id for the same session state (login fixation defense)
    pub fn regenerate(&self, session: &mut Session) -> Result<(), SessionError> {
        session.rotate_id(random_token()?);
        Ok(())
    }

    /// Drop the session: state cleared, store entry removed on flush
    pub fn destroy(&self, session: &mut Session) {
        session.mark_destroyed();
    }

    /// `Set-Cookie` value reflecting the session's final state
    pub fn cookie_header(&self, session: &Session) -> String {
        let mut cookie = if session.is_destroyed() {
            format!("{}=deleted; Path=/; Max-Age=0", self.cookie_name)
        } else {
            format!("{}={}; Path=/", self.cookie_name, session.id())
        };
        cookie.push_str("; HttpOnly; SameSite=Lax");
        if self.cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Remove idle sessions from the store
    pub fn prune(&self) -> Result<usize, SessionError> {
        self.store.prune_expired(self.lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, SessionData, SessionUser};
    use chrono::{Duration as ChronoDuration, Utc};

    fn manager() -> (SessionManager, MemorySessionStore) {
        let store = MemorySessionStore::new();
        let config = Config {
            session_lifetime: Duration::from_secs(3600),
            session_cookie_name: "PHPSESSID".into(),
            session_cookie_secure: false,
            ..Config::default()
        };
        (SessionManager::new(Arc::new(store.clone()), &config), store)
    }

    fn user() -> SessionUser {
        SessionUser {
            id: 7,
            email: "prof@ecole.local".into(),
            nom: "Curie".into(),
            prenom: "Marie".into(),
            role_id: 2,
            role: "professor".into(),
            is_admin: false,
        }
    }

    #[test]
    fn unknown_cookie_starts_fresh_session() {
        let (manager, _) = manager();
        let session = manager.start(Some("not-a-token")).unwrap();
        assert!(session.is_new());
        assert_ne!(session.id(), "not-a-token");
    }

    #[test]
    fn flushed_session_resumes() {
        let (manager, store) = manager();
        let mut session = manager.start(None).unwrap();
        session.set_user(user());
        manager.flush(&session).unwrap();
        assert_eq!(store.len(), 1);

        let resumed = manager.start(Some(session.id())).unwrap();
        assert!(!resumed.is_new());
        assert_eq!(resumed.user().unwrap().id, 7);
    }

    #[test]
    fn expired_session_is_replaced() {
        let (manager, store) = manager();
        let id = random_token().unwrap();
        let mut data = SessionData::new();
        data.last_activity = Utc::now() - ChronoDuration::hours(2);
        store.save(&id, &data).unwrap();

        let session = manager.start(Some(&id)).unwrap();
        assert!(session.is_new());
        assert!(store.load(&id).unwrap().is_none());
    }

    #[test]
    fn regenerate_removes_old_entry_on_flush() {
        let (manager, store) = manager();
        let first = manager.start(None).unwrap();
        manager.flush(&first).unwrap();

        let mut session = manager.start(Some(first.id())).unwrap();
        manager.regenerate(&mut session).unwrap();
        manager.flush(&session).unwrap();

        assert_ne!(session.id(), first.id());
        assert!(store.load(first.id()).unwrap().is_none());
        assert!(store.load(session.id()).unwrap().is_some());
    }

    #[test]
    fn destroyed_session_clears_cookie() {
        let (manager, store) = manager();
        let mut session = manager.start(None).unwrap();
        session.set_user(user());
        manager.flush(&session).unwrap();

        manager.destroy(&mut session);
        manager.flush(&session).unwrap();
        assert!(store.is_empty());

        let cookie = manager.cookie_header(&session);
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[test]
    fn cookie_attributes() {
        let (manager, _) = manager();
        let session = manager.start(None).unwrap();
        let cookie = manager.cookie_header(&session);
        assert!(cookie.starts_with(&format!("PHPSESSID={}", session.id())));
        assert!(cookie.contains("HttpOnly"));
        assert!(!cookie.contains("Secure"));
    }
}
