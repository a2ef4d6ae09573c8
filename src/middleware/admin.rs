use tracing::warn;

use super::auth::{reject, AuthStage};
use super::{Middleware, Next};
use crate::error::{AppError, HandlerResult};
use crate::http::Request;
use crate::state::AppState;

/// Restricts a route to administrators; attach after `Auth`
pub struct AdminMiddleware;

impl Middleware for AdminMiddleware {
    fn name(&self) -> &'static str {
        "Admin"
    }

    fn handle(&self, state: &AppState, req: &mut Request, next: Next<'_>) -> HandlerResult {
        let Some(user) = req.user() else {
            return reject(state, req, AuthStage::Unchecked, AppError::AuthenticationRequired);
        };
        if !user.is_admin {
            warn!(user_id = user.id, path = %req.path(), "Administrator access denied");
            return reject(state, req, AuthStage::Forwarded, AppError::AuthorizationDenied);
        }
        next.run(state, req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::http::Response;
    use crate::middleware::{AuthMiddleware, Handler};
    use crate::models::NewUser;
    use crate::session::{Session, SessionData};
    use axum::http::{header, StatusCode};
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::new(Config {
            password_hash_iterations: 1_000,
            ..Config::default()
        })
        .unwrap()
    }

    fn request(state: &AppState, is_admin: bool) -> Request {
        let role = state.store.require_role("professor").unwrap();
        let record = state
            .store
            .create_user(NewUser {
                email: "x@ecole.local".into(),
                nom: "X".into(),
                prenom: "Y".into(),
                password_hash: "x".into(),
                role_id: role.id,
                is_admin,
            })
            .unwrap();
        let mut data = SessionData::new();
        data.user = Some(state.auth.snapshot(&record));
        let http = axum::http::Request::builder()
            .uri("/users")
            .header(header::ACCEPT, "application/json")
            .body(bytes::Bytes::new())
            .unwrap();
        Request::from_http(http, Session::resume("e".repeat(64), data))
    }

    fn ok(_: &AppState, _: &mut Request) -> HandlerResult {
        Ok(Response::no_content())
    }

    fn run(state: &AppState, req: &mut Request) -> HandlerResult {
        let chain: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(AuthMiddleware::new()), Arc::new(AdminMiddleware)];
        let handler: &dyn Handler = &ok;
        Next::new(&chain, handler).run(state, req)
    }

    #[test]
    fn non_admin_is_forbidden() {
        let state = state();
        let response = run(&state, &mut request(&state, false)).unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn admin_passes() {
        let state = state();
        let response = run(&state, &mut request(&state, true)).unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[test]
    fn missing_user_is_unauthenticated() {
        let state = state();
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(AdminMiddleware)];
        let handler: &dyn Handler = &ok;
        let response = Next::new(&chain, handler)
            .run(&state, &mut request(&state, true))
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
