//! Credential checks and session login/logout.
//!
//! Passwords are stored as PBKDF2-HMAC-SHA256 hashes. A successful login
//! rotates the session id and issues a fresh CSRF token, so a token or id
//! captured before login is useless afterwards.

use tracing::{debug, info, warn};

use crate::crypto::{hash_password, verify_password};
use crate::error::AppError;
use crate::models::{roles, NewUser, User, UserId};
use crate::session::{CsrfGuard, Session, SessionManager, SessionUser};
use crate::store::Store;

/// Validated registration input
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub password: String,
}

#[derive(Clone)]
pub struct AuthService {
    store: Store,
    iterations: u32,
}

impl AuthService {
    pub fn new(store: Store, iterations: u32) -> Self {
        Self { store, iterations }
    }

    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        hash_password(password, self.iterations)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    /// User owning these credentials
    pub fn attempt(&self, email: &str, password: &str) -> Result<User, AppError> {
        let user = self.store.find_user_by_email(email)?;
        match user {
            Some(user) if verify_password(password, &user.password_hash) => Ok(user),
            _ => {
                warn!("Failed login attempt");
                Err(AppError::InvalidCredentials)
            }
        }
    }

    /// Session snapshot of a user
    pub fn snapshot(&self, user: &User) -> SessionUser {
        SessionUser {
            id: user.id,
            email: user.email.clone(),
            nom: user.nom.clone(),
            prenom: user.prenom.clone(),
            role_id: user.role_id,
            role: self.store.role_name(user.role_id),
            is_admin: user.is_admin,
        }
    }

    /// Bind `user` to the session; returns the new CSRF token
    pub fn login(
        &self,
        sessions: &SessionManager,
        csrf: &CsrfGuard,
        session: &mut Session,
        user: &User,
    ) -> Result<String, AppError> {
        sessions.regenerate(session)?;
        session.set_user(self.snapshot(user));
        session.touch();
        let token = csrf.regenerate(session)?;
        info!(user_id = user.id, "User logged in");
        Ok(token)
    }

    pub fn logout(&self, sessions: &SessionManager, csrf: &CsrfGuard, session: &mut Session) {
        if let Some(user) = session.user() {
            info!(user_id = user.id, "User logged out");
        }
        csrf.forget(session.id());
        sessions.destroy(session);
    }

    /// Create a student account
    pub fn register(&self, input: Registration) -> Result<User, AppError> {
        let role = self.store.require_role(roles::STUDENT)?;
        let user = self.store.create_user(NewUser {
            email: input.email,
            nom: input.nom,
            prenom: input.prenom,
            password_hash: self.hash(&input.password)?,
            role_id: role.id,
            is_admin: false,
        })?;
        info!(user_id = user.id, "Registered user");
        Ok(user)
    }

    pub fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .store
            .find_user(user_id)?
            .ok_or(AppError::AuthenticationRequired)?;
        if !verify_password(current, &user.password_hash) {
            return Err(AppError::invalid(
                "current_password",
                "Mot de passe actuel incorrect",
            ));
        }
        let password_hash = self.hash(new_password)?;
        self.store
            .update_user(user_id, |u| u.password_hash = password_hash)?;
        debug!(user_id, "Password changed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::random_token;
    use crate::session::{MemorySessionStore, SessionData};
    use std::sync::Arc;
    use std::time::Duration;

    fn service() -> AuthService {
        AuthService::new(Store::new(), 1_000)
    }

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.into(),
            nom: "Curie".into(),
            prenom: "Marie".into(),
            password: "radium-1898".into(),
        }
    }

    #[test]
    fn register_then_attempt() {
        let auth = service();
        let user = auth.register(registration("marie@ecole.local")).unwrap();
        assert!(!user.is_admin);
        assert_ne!(user.password_hash, "radium-1898");

        assert_eq!(auth.attempt("MARIE@ecole.local", "radium-1898").unwrap().id, user.id);
        assert!(matches!(
            auth.attempt("marie@ecole.local", "wrong"),
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.attempt("nobody@ecole.local", "radium-1898"),
            Err(AppError::InvalidCredentials)
        ));
    }

    #[test]
    fn snapshot_carries_role_name() {
        let auth = service();
        let user = auth.register(registration("s@ecole.local")).unwrap();
        assert_eq!(auth.snapshot(&user).role, "student");
    }

    #[test]
    fn login_rotates_session_and_token() {
        let auth = service();
        let user = auth.register(registration("p@ecole.local")).unwrap();
        let config = Config::default();
        let sessions = SessionManager::new(Arc::new(MemorySessionStore::new()), &config);
        let csrf = CsrfGuard::new(Duration::from_secs(3600));

        let original = random_token().unwrap();
        let mut session = Session::resume(original.clone(), SessionData::new());
        let before = csrf.token(&mut session).unwrap();

        let token = auth.login(&sessions, &csrf, &mut session, &user).unwrap();
        assert_ne!(session.id(), original);
        assert_eq!(session.replaced_id(), Some(original.as_str()));
        assert_ne!(token, before);
        assert_eq!(session.user().unwrap().id, user.id);

        auth.logout(&sessions, &csrf, &mut session);
        assert!(session.is_destroyed());
        assert!(session.user().is_none());
    }

    #[test]
    fn change_password_requires_current() {
        let auth = service();
        let user = auth.register(registration("c@ecole.local")).unwrap();

        assert!(matches!(
            auth.change_password(user.id, "nope", "new-password-1"),
            Err(AppError::ValidationFailed(_))
        ));
        auth.change_password(user.id, "radium-1898", "new-password-1")
            .unwrap();
        assert!(auth.attempt("c@ecole.local", "new-password-1").is_ok());
    }
}
