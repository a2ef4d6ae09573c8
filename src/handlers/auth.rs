//! Login, registration and account endpoints.

use serde_json::json;
use tracing::info;

use super::{actor, dashboard_url, view};
use crate::auth::Registration;
use crate::error::{AppError, HandlerResult};
use crate::http::{Request, Response};
use crate::models::{ChangePasswordRequest, LoginRequest, RegisterRequest};
use crate::state::AppState;
use crate::validation::Validator;

const MIN_PASSWORD_LEN: usize = 8;

// === Tokens ===

/// GET /auth/csrf-token - Token bound to the caller's session
pub fn csrf_token(state: &AppState, req: &mut Request) -> HandlerResult {
    let token = state.csrf.token(req.session_mut())?;
    Ok(Response::success("Token CSRF", json!({ "csrf_token": token })))
}

/// GET /auth/login - Login entry point, also the redirect target for guests
pub fn login_form(state: &AppState, req: &mut Request) -> HandlerResult {
    if let Some(user) = req.session().user() {
        let home = dashboard_url(state, &user.role, user.is_admin);
        return Ok(Response::redirect(&home));
    }
    let token = state.csrf.token(req.session_mut())?;
    Ok(Response::success(
        "Authentification requise",
        json!({
            "csrf_token": token,
            "intended_url": req.session().data().intended_url,
        }),
    ))
}

// === Session ===

/// POST /auth/login - Authenticate and bind the user to the session
///
/// The anti-forgery token is checked here since no auth middleware guards
/// this route. The session id and token are both rotated on success.
pub fn login(state: &AppState, req: &mut Request) -> HandlerResult {
    state.csrf.verify(req)?;

    let input: LoginRequest = req.payload()?;
    let mut v = Validator::new();
    if let Some(email) = v.required("email", input.email.as_deref()) {
        v.email("email", email);
    }
    v.required("password", input.password.as_deref());
    v.finish()?;

    let email = input.email.unwrap_or_default();
    let password = input.password.unwrap_or_default();
    let user = state.auth.attempt(email.trim(), &password)?;

    let session = req.session_mut();
    let intended = session.take_intended_url();
    let token = state
        .auth
        .login(&state.sessions, &state.csrf, session, &user)?;

    let role = state.store.role_name(user.role_id);
    let redirect = intended.unwrap_or_else(|| dashboard_url(state, &role, user.is_admin));
    Ok(Response::success(
        "Connexion réussie",
        json!({
            "user": view(state, &user),
            "csrf_token": token,
            "redirect": redirect,
        }),
    ))
}

/// POST /auth/logout
pub fn logout(state: &AppState, req: &mut Request) -> HandlerResult {
    state
        .auth
        .logout(&state.sessions, &state.csrf, req.session_mut());
    Ok(Response::message("Déconnexion réussie"))
}

// === Accounts ===

/// POST /auth/register - Create a student account
pub fn register(state: &AppState, req: &mut Request) -> HandlerResult {
    state.csrf.verify(req)?;

    let input: RegisterRequest = req.payload()?;
    let mut v = Validator::new();
    let email = v.required("email", input.email.as_deref());
    if let Some(email) = email {
        v.email("email", email);
    }
    let nom = v.required("nom", input.nom.as_deref());
    let prenom = v.required("prenom", input.prenom.as_deref());
    if let Some(nom) = nom {
        v.max_len("nom", nom, 100);
    }
    if let Some(prenom) = prenom {
        v.max_len("prenom", prenom, 100);
    }
    if v.required("password", input.password.as_deref()).is_some() {
        let password = input.password.as_deref().unwrap_or_default();
        v.min_len("password", password, MIN_PASSWORD_LEN);
        v.confirmed(
            "password_confirmation",
            password,
            input.password_confirmation.as_deref(),
        );
    }

    let registration = Registration {
        email: email.unwrap_or_default().to_string(),
        nom: nom.unwrap_or_default().to_string(),
        prenom: prenom.unwrap_or_default().to_string(),
        password: input.password.clone().unwrap_or_default(),
    };
    v.finish()?;

    let user = state.auth.register(registration)?;
    Ok(Response::created(
        "Inscription réussie",
        json!({ "user": view(state, &user) }),
    ))
}

/// GET /auth/me - Current user, read fresh from the store
pub fn me(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let user = state
        .store
        .find_user(current.id)?
        .ok_or(AppError::AuthenticationRequired)?;
    Ok(Response::success(
        "Utilisateur courant",
        json!({ "user": view(state, &user) }),
    ))
}

/// PUT /auth/change-password
pub fn change_password(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let input: ChangePasswordRequest = req.payload()?;

    let mut v = Validator::new();
    v.required("current_password", input.current_password.as_deref());
    if v.required("new_password", input.new_password.as_deref()).is_some() {
        let new_password = input.new_password.as_deref().unwrap_or_default();
        v.min_len("new_password", new_password, MIN_PASSWORD_LEN);
        v.confirmed(
            "new_password_confirmation",
            new_password,
            input.new_password_confirmation.as_deref(),
        );
    }
    v.finish()?;

    state.auth.change_password(
        current.id,
        input.current_password.as_deref().unwrap_or_default(),
        input.new_password.as_deref().unwrap_or_default(),
    )?;
    state.csrf.regenerate(req.session_mut())?;
    info!(user_id = current.id, "Password updated");
    Ok(Response::message("Mot de passe modifié"))
}
