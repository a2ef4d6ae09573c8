//! Matières: role-scoped reads, admin CRUD.

use serde_json::json;

use super::{actor, load_matiere};
use crate::error::{AppError, HandlerResult};
use crate::http::{Request, Response};
use crate::models::{roles, Evaluation, Matiere, MatiereRequest, NewMatiere, UserId};
use crate::policy::EvaluationPolicy;
use crate::state::AppState;
use crate::validation::Validator;

/// Professor must hold the professor role; enrolled ids must be students
fn check_people(
    state: &AppState,
    v: &mut Validator,
    professeur_id: Option<UserId>,
    etudiants: Option<&[UserId]>,
) -> Result<(), AppError> {
    if let Some(id) = professeur_id {
        let is_professor = state
            .store
            .find_user(id)?
            .is_some_and(|u| state.store.role_name(u.role_id) == roles::PROFESSOR);
        if !is_professor {
            v.add("professeur_id", "Le professeur sélectionné est invalide");
        }
    }
    for (i, &id) in etudiants.unwrap_or_default().iter().enumerate() {
        let is_student = state
            .store
            .find_user(id)?
            .is_some_and(|u| state.store.role_name(u.role_id) == roles::STUDENT);
        if !is_student {
            v.add(&format!("etudiants.{i}"), "Cet utilisateur n'est pas un étudiant");
        }
    }
    Ok(())
}

/// GET /matieres - Matières visible to the caller
pub fn index(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let policy = EvaluationPolicy::for_user(&current);
    let matieres: Vec<Matiere> = state
        .store
        .list_matieres()
        .into_iter()
        .filter(|m| policy.can_view_matiere(m))
        .collect();
    Ok(Response::success(
        "Liste des matières",
        json!({ "matieres": matieres, "total": matieres.len() }),
    ))
}

/// GET /matieres/:id - One matière with the evaluations the caller may see
pub fn show(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let policy = EvaluationPolicy::for_user(&current);
    let matiere = load_matiere(state, req.param_id("id")?)?;
    if !policy.can_view_matiere(&matiere) {
        return Err(AppError::AuthorizationDenied);
    }

    let evaluations: Vec<Evaluation> = state
        .store
        .list_evaluations()
        .iter()
        .filter(|e| e.matiere_id == matiere.id)
        .map(|e| policy.project(e))
        .collect();
    Ok(Response::success(
        "Matière",
        json!({ "matiere": matiere, "evaluations": evaluations }),
    ))
}

/// POST /matieres
pub fn store(state: &AppState, req: &mut Request) -> HandlerResult {
    let input: MatiereRequest = req.payload()?;

    let mut v = Validator::new();
    let code = v.required("code", input.code.as_deref());
    if let Some(code) = code {
        v.max_len("code", code, 20);
    }
    let nom = v.required("nom", input.nom.as_deref());
    if let Some(nom) = nom {
        v.max_len("nom", nom, 150);
    }
    check_people(state, &mut v, input.professeur_id, input.etudiants.as_deref())?;

    let new = NewMatiere {
        code: code.unwrap_or_default().to_uppercase(),
        nom: nom.unwrap_or_default().to_string(),
        description: input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        professeur_id: input.professeur_id,
        etudiants: input.etudiants.clone().unwrap_or_default(),
    };
    v.finish()?;

    let matiere = state.store.create_matiere(new)?;
    Ok(Response::created("Matière créée", json!({ "matiere": matiere })))
}

/// PUT /matieres/:id - Partial update
pub fn update(state: &AppState, req: &mut Request) -> HandlerResult {
    let id = req.param_id("id")?;
    load_matiere(state, id)?;
    let input: MatiereRequest = req.payload()?;

    let mut v = Validator::new();
    let code = input
        .code
        .as_deref()
        .and_then(|raw| v.required("code", Some(raw)))
        .map(str::to_uppercase);
    let nom = input
        .nom
        .as_deref()
        .and_then(|raw| v.required("nom", Some(raw)))
        .map(str::to_string);
    if let Some(code) = &code {
        v.max_len("code", code, 20);
    }
    if let Some(nom) = &nom {
        v.max_len("nom", nom, 150);
    }
    check_people(state, &mut v, input.professeur_id, input.etudiants.as_deref())?;
    v.finish()?;

    let matiere = state.store.update_matiere(id, |m| {
        if let Some(code) = code {
            m.code = code;
        }
        if let Some(nom) = nom {
            m.nom = nom;
        }
        if let Some(description) = input.description {
            let description = description.trim().to_string();
            m.description = (!description.is_empty()).then_some(description);
        }
        if input.professeur_id.is_some() {
            m.professeur_id = input.professeur_id;
        }
        if let Some(etudiants) = input.etudiants {
            m.etudiants = etudiants;
        }
    })?;
    Ok(Response::success(
        "Matière mise à jour",
        json!({ "matiere": matiere }),
    ))
}

/// DELETE /matieres/:id - Refused while evaluations exist
pub fn destroy(state: &AppState, req: &mut Request) -> HandlerResult {
    let id = req.param_id("id")?;
    state.store.delete_matiere(id)?;
    Ok(Response::message("Matière supprimée"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{self, body, request};
    use axum::http::{Method, StatusCode};

    #[test]
    fn admin_creates_matiere_with_checked_people() {
        let state = testing::state();
        let admin = testing::admin(&state);
        let prof = testing::professor(&state, "prof@ecole.local");
        let eleve = testing::student(&state, "eleve@ecole.local");

        let mut bad = request(
            &state,
            Method::POST,
            "/matieres",
            json!({ "code": "PHY", "nom": "Physique", "professeur_id": eleve.id, "etudiants": [prof.id] }),
            Some(&admin),
        );
        match store(&state, &mut bad) {
            Err(AppError::ValidationFailed(errors)) => {
                assert!(errors.contains_key("professeur_id"));
                assert!(errors.contains_key("etudiants.0"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut good = request(
            &state,
            Method::POST,
            "/matieres",
            json!({ "code": "phy", "nom": "Physique", "professeur_id": prof.id, "etudiants": [eleve.id] }),
            Some(&admin),
        );
        let response = store(&state, &mut good).unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body(&response)["data"]["matiere"]["code"], "PHY");
    }

    #[test]
    fn listing_is_scoped_by_role() {
        let state = testing::state();
        let prof = testing::professor(&state, "prof@ecole.local");
        let eleve = testing::student(&state, "eleve@ecole.local");
        for (code, professeur_id, etudiants) in [
            ("MATH", Some(prof.id), vec![eleve.id]),
            ("HIST", None, vec![]),
        ] {
            state
                .store
                .create_matiere(NewMatiere {
                    code: code.into(),
                    nom: code.into(),
                    description: None,
                    professeur_id,
                    etudiants,
                })
                .unwrap();
        }

        for who in [&prof, &eleve] {
            let mut req = request(&state, Method::GET, "/matieres", json!({}), Some(who));
            let response = index(&state, &mut req).unwrap();
            assert_eq!(body(&response)["data"]["total"], 1);
        }

        let admin = testing::admin(&state);
        let mut req = request(&state, Method::GET, "/matieres", json!({}), Some(&admin));
        assert_eq!(body(&index(&state, &mut req).unwrap())["data"]["total"], 2);
    }
}
