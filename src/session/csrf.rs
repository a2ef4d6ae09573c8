//! Anti-forgery tokens bound to sessions.
//!
//! Each session owns at most one live token. Tokens are kept in the session
//! data and mirrored in an in-process cache keyed by session id so repeated
//! checks avoid touching the session copy. A token is only ever compared
//! with the one bound to the requesting session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Session;
use crate::crypto::{constant_time_eq, random_token};
use crate::error::AppError;
use crate::http::Request;

/// Token value and issuance time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfToken {
    pub value: String,
    pub issued_at: DateTime<Utc>,
}

impl CsrfToken {
    fn is_expired(&self, lifetime: Duration) -> bool {
        let age = (Utc::now() - self.issued_at).to_std().unwrap_or_default();
        age >= lifetime
    }
}

/// Outcome of checking a submitted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfCheck {
    Valid,
    /// Nothing was submitted
    Missing,
    /// Submitted token differs from the session's, or the session has none
    Mismatch,
    /// The session's token outlived its window
    Expired,
}

/// Issues and validates per-session CSRF tokens
#[derive(Clone)]
pub struct CsrfGuard {
    cache: Arc<DashMap<String, CsrfToken>>,
    lifetime: Duration,
}

impl CsrfGuard {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Live token for the session, issuing a new one if absent or expired
    pub fn token(&self, session: &mut Session) -> Result<String, AppError> {
        if let Some(token) = self.bound_token(session) {
            if !token.is_expired(self.lifetime) {
                return Ok(token.value);
            }
        }
        self.regenerate(session)
    }

    /// Replace the session's token unconditionally
    pub fn regenerate(&self, session: &mut Session) -> Result<String, AppError> {
        let token = CsrfToken {
            value: random_token().map_err(crate::session::SessionError::from)?,
            issued_at: Utc::now(),
        };
        if let Some(old) = session.replaced_id() {
            self.cache.remove(old);
        }
        self.cache.insert(session.id().to_string(), token.clone());
        let value = token.value.clone();
        session.set_csrf(Some(token));
        debug!("Issued CSRF token");
        Ok(value)
    }

    /// Compare a submitted token against the one bound to `session`
    pub fn check(&self, session: &Session, provided: Option<&str>) -> CsrfCheck {
        let Some(provided) = provided.filter(|p| !p.is_empty()) else {
            return CsrfCheck::Missing;
        };
        let Some(bound) = self.bound_token(session) else {
            return CsrfCheck::Mismatch;
        };
        if bound.is_expired(self.lifetime) {
            return CsrfCheck::Expired;
        }
        if constant_time_eq(bound.value.as_bytes(), provided.as_bytes()) {
            CsrfCheck::Valid
        } else {
            CsrfCheck::Mismatch
        }
    }

    /// Check the token carried by `req` against its session
    pub fn verify(&self, req: &Request) -> Result<(), AppError> {
        match self.check(req.session(), req.csrf_input().as_deref()) {
            CsrfCheck::Valid => Ok(()),
            CsrfCheck::Missing => Err(AppError::CsrfMissing),
            CsrfCheck::Mismatch | CsrfCheck::Expired => Err(AppError::CsrfInvalid),
        }
    }

    /// Drop the cached token of a session
    pub fn forget(&self, session_id: &str) {
        self.cache.remove(session_id);
    }

    /// Remove expired tokens from the cache; returns how many
    pub fn prune(&self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, token| !token.is_expired(self.lifetime));
        before.saturating_sub(self.cache.len())
    }

    fn bound_token(&self, session: &Session) -> Option<CsrfToken> {
        if let Some(cached) = self.cache.get(session.id()) {
            return Some(cached.value().clone());
        }
        let stored = session.csrf()?.clone();
        self.cache.insert(session.id().to_string(), stored.clone());
        Some(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::random_token;
    use crate::session::SessionData;

    fn session() -> Session {
        Session::fresh(random_token().unwrap())
    }

    #[test]
    fn token_validates_for_its_session() {
        let guard = CsrfGuard::new(Duration::from_secs(3600));
        let mut s = session();
        let token = guard.token(&mut s).unwrap();

        assert_eq!(guard.check(&s, Some(&token)), CsrfCheck::Valid);
        assert_eq!(guard.check(&s, Some("forged")), CsrfCheck::Mismatch);
        assert_eq!(guard.check(&s, None), CsrfCheck::Missing);
        assert_eq!(guard.check(&s, Some("")), CsrfCheck::Missing);
    }

    #[test]
    fn token_is_stable_within_lifetime() {
        let guard = CsrfGuard::new(Duration::from_secs(3600));
        let mut s = session();
        let first = guard.token(&mut s).unwrap();
        let second = guard.token(&mut s).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn token_fails_for_other_session() {
        let guard = CsrfGuard::new(Duration::from_secs(3600));
        let mut alice = session();
        let mut bob = session();
        let alice_token = guard.token(&mut alice).unwrap();
        guard.token(&mut bob).unwrap();

        assert_eq!(guard.check(&bob, Some(&alice_token)), CsrfCheck::Mismatch);
    }

    #[test]
    fn session_without_token_rejects() {
        let guard = CsrfGuard::new(Duration::from_secs(3600));
        let s = session();
        assert_eq!(guard.check(&s, Some("anything")), CsrfCheck::Mismatch);
    }

    #[test]
    fn expired_token_fails_and_is_reissued() {
        let guard = CsrfGuard::new(Duration::ZERO);
        let mut s = session();
        let token = guard.token(&mut s).unwrap();
        assert_eq!(guard.check(&s, Some(&token)), CsrfCheck::Expired);

        let renewed = guard.token(&mut s).unwrap();
        assert_ne!(token, renewed);
    }

    #[test]
    fn token_survives_cache_loss_through_session_data() {
        let guard = CsrfGuard::new(Duration::from_secs(3600));
        let mut s = session();
        let token = guard.token(&mut s).unwrap();

        // A second process-local guard only knows the persisted session data
        let other = CsrfGuard::new(Duration::from_secs(3600));
        let resumed = Session::resume(s.id().to_string(), s.data().clone());
        assert_eq!(other.check(&resumed, Some(&token)), CsrfCheck::Valid);
    }

    #[test]
    fn prune_drops_expired_entries() {
        let guard = CsrfGuard::new(Duration::ZERO);
        let mut s = session();
        guard.token(&mut s).unwrap();
        assert_eq!(guard.prune(), 1);

        let empty = Session::resume("x".into(), SessionData::new());
        assert_eq!(guard.check(&empty, Some("t")), CsrfCheck::Mismatch);
    }
}
