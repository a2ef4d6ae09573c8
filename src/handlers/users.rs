//! User administration.

use serde_json::json;

use super::{actor, view};
use crate::error::{AppError, HandlerResult};
use crate::http::{Request, Response};
use crate::models::{roles, UpdateUserRequest, UserView};
use crate::session::AuthenticatedUser;
use crate::state::AppState;
use crate::validation::Validator;

fn ensure_self_or_admin(actor: &AuthenticatedUser, id: i64) -> Result<(), AppError> {
    if actor.id == id || actor.is_admin {
        Ok(())
    } else {
        Err(AppError::AuthorizationDenied)
    }
}

/// GET /users - All accounts, optionally filtered by `?role=`
pub fn index(state: &AppState, req: &mut Request) -> HandlerResult {
    let users = match req.query("role") {
        Some(name) => match state.store.find_role_by_name(&name)? {
            Some(role) => state.store.users_with_role(role.id),
            None => Vec::new(),
        },
        None => state.store.list_users(),
    };
    let views: Vec<UserView> = users.iter().map(|u| view(state, u)).collect();
    Ok(Response::success(
        "Liste des utilisateurs",
        json!({ "users": views, "total": views.len() }),
    ))
}

/// GET /users/:id
pub fn show(state: &AppState, req: &mut Request) -> HandlerResult {
    let id = req.param_id("id")?;
    ensure_self_or_admin(&actor(req)?, id)?;
    let user = state
        .store
        .find_user(id)?
        .ok_or_else(|| AppError::NotFound("Utilisateur introuvable".to_string()))?;
    Ok(Response::success(
        "Utilisateur",
        json!({ "user": view(state, &user) }),
    ))
}

/// PUT /users/:id - Profile fields; role and admin flag are admin-only
pub fn update(state: &AppState, req: &mut Request) -> HandlerResult {
    let id = req.param_id("id")?;
    let current = actor(req)?;
    ensure_self_or_admin(&current, id)?;

    let input: UpdateUserRequest = req.payload()?;
    if (input.role.is_some() || input.is_admin.is_some()) && !current.is_admin {
        return Err(AppError::AuthorizationDenied);
    }

    let mut v = Validator::new();
    let email = match input.email.as_deref() {
        Some(raw) => v.required("email", Some(raw)).map(|email| {
            v.email("email", email);
            email.to_string()
        }),
        None => None,
    };
    let nom = input
        .nom
        .as_deref()
        .and_then(|raw| v.required("nom", Some(raw)))
        .map(str::to_string);
    let prenom = input
        .prenom
        .as_deref()
        .and_then(|raw| v.required("prenom", Some(raw)))
        .map(str::to_string);
    let role_id = match input.role.as_deref() {
        Some(name) => {
            v.one_of("role", name, &[roles::ADMIN, roles::PROFESSOR, roles::STUDENT]);
            state.store.find_role_by_name(name)?.map(|role| role.id)
        }
        None => None,
    };
    v.finish()?;

    let updated = state.store.update_user(id, |user| {
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(nom) = nom {
            user.nom = nom;
        }
        if let Some(prenom) = prenom {
            user.prenom = prenom;
        }
        if let Some(role_id) = role_id {
            user.role_id = role_id;
        }
        if let Some(is_admin) = input.is_admin {
            user.is_admin = is_admin;
        }
    })?;

    if current.id == id {
        let snapshot = state.auth.snapshot(&updated);
        req.session_mut().set_user(snapshot);
    }

    Ok(Response::success(
        "Utilisateur mis à jour",
        json!({ "user": view(state, &updated) }),
    ))
}

/// DELETE /users/:id
pub fn destroy(state: &AppState, req: &mut Request) -> HandlerResult {
    let id = req.param_id("id")?;
    if actor(req)?.id == id {
        return Err(AppError::BadRequest(
            "Impossible de supprimer votre propre compte".to_string(),
        ));
    }
    state.store.delete_user(id)?;
    Ok(Response::message("Utilisateur supprimé"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{self, body, request};
    use axum::http::Method;

    #[test]
    fn student_reads_only_own_profile() {
        let state = testing::state();
        let alice = testing::student(&state, "alice@ecole.local");
        let bob = testing::student(&state, "bob@ecole.local");

        let mut own = request(&state, Method::GET, &format!("/users/{}", alice.id), json!({}), Some(&alice));
        assert!(show(&state, &mut own).is_ok());

        let mut other = request(&state, Method::GET, &format!("/users/{}", bob.id), json!({}), Some(&alice));
        assert!(matches!(show(&state, &mut other), Err(AppError::AuthorizationDenied)));
    }

    #[test]
    fn only_admin_changes_roles() {
        let state = testing::state();
        let alice = testing::student(&state, "alice@ecole.local");
        let uri = format!("/users/{}", alice.id);

        let mut req = request(&state, Method::PUT, &uri, json!({ "role": "professor" }), Some(&alice));
        assert!(matches!(update(&state, &mut req), Err(AppError::AuthorizationDenied)));

        let admin = testing::admin(&state);
        let mut req = request(&state, Method::PUT, &uri, json!({ "role": "professor" }), Some(&admin));
        let response = update(&state, &mut req).unwrap();
        assert_eq!(body(&response)["data"]["user"]["role"], "professor");
    }

    #[test]
    fn self_update_refreshes_session_snapshot() {
        let state = testing::state();
        let alice = testing::student(&state, "alice@ecole.local");
        let uri = format!("/users/{}", alice.id);

        let mut req = request(&state, Method::PUT, &uri, json!({ "nom": "Martin" }), Some(&alice));
        update(&state, &mut req).unwrap();
        assert_eq!(req.session().user().unwrap().nom, "Martin");
    }

    #[test]
    fn admin_cannot_delete_self() {
        let state = testing::state();
        let admin = testing::admin(&state);
        let mut req = request(&state, Method::DELETE, &format!("/users/{}", admin.id), json!({}), Some(&admin));
        assert!(matches!(destroy(&state, &mut req), Err(AppError::BadRequest(_))));

        let bob = testing::student(&state, "bob@ecole.local");
        let mut req = request(&state, Method::DELETE, &format!("/users/{}", bob.id), json!({}), Some(&admin));
        destroy(&state, &mut req).unwrap();
        assert!(state.store.find_user(bob.id).unwrap().is_none());
    }
}
