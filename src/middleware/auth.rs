//! Session authentication, CSRF verification and role checks.
//!
//! ```text
//! Unchecked → SessionValidated → UserResolved → CsrfValidated → RoleAuthorized → Forwarded
//!                                               (mutating only)  (roles only)
//! ```
//!
//! Expected rejections become 401/403/422 JSON for API clients. Browsers
//! are redirected to the login route (401) or get the fault itself (403).

use axum::http::Method;
use tracing::{debug, error, warn};

use super::{Middleware, Next};
use crate::error::{AppError, HandlerResult};
use crate::http::{Request, Response};
use crate::session::{AuthenticatedUser, SessionUser};
use crate::state::AppState;

/// Fallback when the route table has no `auth.login` entry
pub const LOGIN_PATH: &str = "/auth/login";

/// Last stage passed, reported in logs on rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    Unchecked,
    SessionValidated,
    UserResolved,
    CsrfValidated,
    RoleAuthorized,
    Forwarded,
}

/// Requires a logged-in user, optionally holding one of `roles`.
///
/// Administrators satisfy every role requirement.
#[derive(Debug, Clone, Default)]
pub struct AuthMiddleware {
    roles: Vec<String>,
}

impl AuthMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: &[&str]) -> Self {
        Self {
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    fn authorize(
        &self,
        state: &AppState,
        req: &mut Request,
        stage: &mut AuthStage,
    ) -> Result<AuthenticatedUser, AppError> {
        let session = req.session();
        if session.is_new() || session.is_destroyed() {
            return Err(AppError::AuthenticationRequired);
        }
        *stage = AuthStage::SessionValidated;

        let user = resolve_user(state, req)?;
        *stage = AuthStage::UserResolved;

        if req.is_mutating() {
            state.csrf.verify(req)?;
            *stage = AuthStage::CsrfValidated;
        }

        if !self.roles.is_empty() && !user.is_admin {
            let mut granted = false;
            for name in &self.roles {
                if let Some(role) = state.store.find_role_by_name(name)? {
                    if role.id == user.role_id {
                        granted = true;
                        break;
                    }
                }
            }
            if !granted {
                return Err(AppError::AuthorizationDenied);
            }
        }
        *stage = AuthStage::RoleAuthorized;

        Ok(AuthenticatedUser::from(&user))
    }
}

/// Re-read the session's user from the store.
///
/// A deleted account logs the session out; a changed role, admin flag or
/// profile replaces the snapshot.
fn resolve_user(state: &AppState, req: &mut Request) -> Result<SessionUser, AppError> {
    let user_id = req
        .session()
        .user()
        .map(|user| user.id)
        .ok_or(AppError::AuthenticationRequired)?;

    let Some(record) = state.store.find_user(user_id)? else {
        warn!(user_id, "Session user no longer exists");
        req.session_mut().clear_user();
        return Err(AppError::AuthenticationRequired);
    };

    let fresh = state.auth.snapshot(&record);
    if req.session().user() != Some(&fresh) {
        debug!(user_id, role = %fresh.role, is_admin = fresh.is_admin, "Session user refreshed");
        req.session_mut().set_user(fresh.clone());
    }
    Ok(fresh)
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "Auth"
    }

    fn handle(&self, state: &AppState, req: &mut Request, next: Next<'_>) -> HandlerResult {
        let mut stage = AuthStage::Unchecked;
        match self.authorize(state, req, &mut stage) {
            Ok(user) => {
                stage = AuthStage::Forwarded;
                debug!(user_id = user.id, role = %user.role, ?stage, "Request authenticated");
                req.session_mut().touch();
                req.set_user(user);
                next.run(state, req)
            }
            Err(err) => reject(state, req, stage, err),
        }
    }
}

/// Turn an auth failure into the response the client kind expects
pub(crate) fn reject(
    state: &AppState,
    req: &mut Request,
    stage: AuthStage,
    err: AppError,
) -> HandlerResult {
    if err.is_server_fault() {
        error!(?stage, error = %err, path = %req.path(), "Authentication fault");
        if req.expects_json() {
            return Ok(err.to_response(state.config.debug));
        }
        return Err(AppError::Middleware(format!(
            "authentication failed at {stage:?}: {err}"
        )));
    }

    warn!(?stage, reason = %err, path = %req.path(), "Request rejected");
    if req.expects_json() {
        return Ok(err.to_response(state.config.debug));
    }

    match err {
        AppError::AuthenticationRequired => {
            if *req.method() == Method::GET {
                let intended = req.full_path();
                req.session_mut().set_intended_url(intended);
            }
            let login = state
                .routes
                .url_for("auth.login", &[])
                .unwrap_or_else(|_| LOGIN_PATH.to_string());
            Ok(Response::redirect(&login))
        }
        other => Err(other),
    }
}
