//! Controllers for the evaluation API.
//!
//! Every handler has the pipeline signature
//! `fn(&AppState, &mut Request) -> HandlerResult` and answers with the JSON
//! envelope. Authentication and role gates run before them as route
//! middleware; the finer per-record rules live in [`crate::policy`].

pub mod auth;
pub mod dashboard;
pub mod evaluations;
pub mod health;
pub mod matieres;
pub mod users;

use crate::error::AppError;
use crate::http::Request;
use crate::models::{roles, Evaluation, EvaluationId, Matiere, MatiereId, User, UserView};
use crate::session::AuthenticatedUser;
use crate::state::AppState;

/// Owned copy of the current user, so the request can be borrowed mutably
fn actor(req: &Request) -> Result<AuthenticatedUser, AppError> {
    req.require_user().cloned()
}

fn view(state: &AppState, user: &User) -> UserView {
    UserView::new(user, &state.store.role_name(user.role_id))
}

fn load_matiere(state: &AppState, id: MatiereId) -> Result<Matiere, AppError> {
    state
        .store
        .find_matiere(id)?
        .ok_or_else(|| AppError::NotFound("Matière introuvable".to_string()))
}

fn load_evaluation(state: &AppState, id: EvaluationId) -> Result<Evaluation, AppError> {
    state
        .store
        .find_evaluation(id)?
        .ok_or_else(|| AppError::NotFound("Évaluation introuvable".to_string()))
}

/// Landing page for a role, resolved through the route names
fn dashboard_url(state: &AppState, role: &str, is_admin: bool) -> String {
    let name = match role {
        _ if is_admin => "admin.dashboard",
        roles::ADMIN => "admin.dashboard",
        roles::PROFESSOR => "professor.dashboard",
        _ => "student.dashboard",
    };
    state
        .routes
        .url_for(name, &[])
        .unwrap_or_else(|_| "/".to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Request fixtures for controller tests.

    use axum::http::{header, Method};
    use bytes::Bytes;
    use serde_json::Value;

    use crate::auth::Registration;
    use crate::config::Config;
    use crate::http::Request;
    use crate::models::{roles, NewUser, User};
    use crate::session::{AuthenticatedUser, Session};
    use crate::state::AppState;

    pub fn state() -> AppState {
        AppState::new(Config {
            password_hash_iterations: 1_000,
            rate_limit_enabled: false,
            ..Config::default()
        })
        .unwrap()
    }

    pub fn user(state: &AppState, email: &str, role: &str) -> User {
        let role = state.store.require_role(role).unwrap();
        state
            .store
            .create_user(NewUser {
                email: email.into(),
                nom: "Nom".into(),
                prenom: "Prénom".into(),
                password_hash: state.auth.hash("password-123").unwrap(),
                role_id: role.id,
                is_admin: false,
            })
            .unwrap()
    }

    pub fn student(state: &AppState, email: &str) -> User {
        state
            .auth
            .register(Registration {
                email: email.into(),
                nom: "Élève".into(),
                prenom: "Test".into(),
                password: "password-123".into(),
            })
            .unwrap()
    }

    pub fn admin(state: &AppState) -> User {
        state
            .store
            .find_user_by_email(&state.config.admin_email)
            .unwrap()
            .unwrap()
    }

    pub fn professor(state: &AppState, email: &str) -> User {
        user(state, email, roles::PROFESSOR)
    }

    /// JSON request acting as `as_user`, with route params already bound
    pub fn request(
        state: &AppState,
        method: Method,
        uri: &str,
        body: Value,
        as_user: Option<&User>,
    ) -> Request {
        let http = axum::http::Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))
            .unwrap();
        let mut req = Request::from_http(http, Session::fresh("t".repeat(64)));
        if let Some(user) = as_user {
            let snapshot = state.auth.snapshot(user);
            req.set_user(AuthenticatedUser::from(&snapshot));
            req.session_mut().set_user(snapshot);
        }
        if let Ok(crate::routing::Resolution::Matched { params, .. }) =
            state.routes.resolve(&method, uri.split('?').next().unwrap_or(uri))
        {
            req.set_params(params);
        }
        req
    }

    /// Guest request whose body carries a valid anti-forgery token
    pub fn guest_with_csrf(state: &AppState, method: Method, uri: &str, mut body: Value) -> Request {
        let mut session = Session::fresh("g".repeat(64));
        let token = state.csrf.token(&mut session).unwrap();
        body[crate::http::CSRF_FIELD] = Value::String(token);
        let mut req = request(state, method, uri, body, None);
        *req.session_mut() = session;
        req
    }

    pub fn body(response: &crate::http::Response) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }
}
