//! Evaluations and their notes.
//!
//! Route middleware only checks the role; every record-level decision goes
//! through [`EvaluationPolicy`].

use std::collections::HashMap;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use super::{actor, load_evaluation, load_matiere};
use crate::error::{AppError, HandlerResult};
use crate::http::{Request, Response};
use crate::models::{
    Evaluation, EvaluationKind, EvaluationRequest, MatiereId, NewEvaluation, Note, NotesRequest,
};
use crate::policy::EvaluationPolicy;
use crate::state::AppState;
use crate::validation::Validator;

const KINDS: &[&str] = &["examen", "controle", "projet", "tp", "oral"];
const DEFAULT_NOTE_MAX: f64 = 20.0;

/// Validated evaluation fields; absent fields stay `None`
#[derive(Default)]
struct EvaluationFields {
    titre: Option<String>,
    kind: Option<EvaluationKind>,
    date: Option<chrono::NaiveDate>,
    coefficient: Option<f64>,
    note_max: Option<f64>,
}

fn check_fields(v: &mut Validator, input: &EvaluationRequest, partial: bool) -> EvaluationFields {
    let present = |value: Option<&str>| !partial || value.is_some();
    let mut fields = EvaluationFields::default();

    if present(input.titre.as_deref()) {
        if let Some(titre) = v.required("titre", input.titre.as_deref()) {
            v.max_len("titre", titre, 150);
            fields.titre = Some(titre.to_string());
        }
    }
    if present(input.kind.as_deref()) {
        if let Some(kind) = v.required("type", input.kind.as_deref()) {
            v.one_of("type", kind, KINDS);
            fields.kind = EvaluationKind::parse(kind);
        }
    }
    if present(input.date.as_deref()) {
        if let Some(date) = v.required("date", input.date.as_deref()) {
            fields.date = v.date("date", date);
        }
    }
    if let Some(coefficient) = input.coefficient {
        v.range("coefficient", coefficient, 0.1, 10.0);
        fields.coefficient = Some(coefficient);
    }
    if let Some(note_max) = input.note_max {
        v.range("note_max", note_max, 1.0, 100.0);
        fields.note_max = Some(note_max);
    }
    fields
}

/// GET /evaluations - Evaluations visible to the caller, newest first
///
/// `?matiere_id=` narrows the listing to one matière.
pub fn index(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let policy = EvaluationPolicy::for_user(&current);
    let only: Option<MatiereId> = req.query("matiere_id").and_then(|m| m.parse().ok());

    let matieres: HashMap<MatiereId, _> = state
        .store
        .list_matieres()
        .into_iter()
        .map(|m| (m.id, m))
        .collect();
    let evaluations: Vec<Evaluation> = state
        .store
        .list_evaluations()
        .iter()
        .filter(|e| only.map_or(true, |id| e.matiere_id == id))
        .filter(|e| {
            matieres
                .get(&e.matiere_id)
                .is_some_and(|m| policy.can_view(e, m))
        })
        .map(|e| policy.project(e))
        .collect();

    Ok(Response::success(
        "Liste des évaluations",
        json!({ "evaluations": evaluations, "total": evaluations.len() }),
    ))
}

/// POST /evaluations
pub fn store(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let input: EvaluationRequest = req.payload()?;

    let mut v = Validator::new();
    let fields = check_fields(&mut v, &input, false);
    let matiere = match input.matiere_id {
        Some(id) => state.store.find_matiere(id)?,
        None => None,
    };
    if matiere.is_none() {
        v.add("matiere_id", "Matière introuvable");
    }
    v.finish()?;

    let (Some(matiere), Some(titre), Some(kind), Some(date)) =
        (matiere, fields.titre, fields.kind, fields.date)
    else {
        return Err(AppError::Internal("evaluation fields missing after validation".into()));
    };
    if !EvaluationPolicy::for_user(&current).can_create_in(&matiere) {
        return Err(AppError::AuthorizationDenied);
    }

    let evaluation = state.store.create_evaluation(NewEvaluation {
        matiere_id: matiere.id,
        titre,
        kind,
        date,
        coefficient: fields.coefficient.unwrap_or(1.0),
        note_max: fields.note_max.unwrap_or(DEFAULT_NOTE_MAX),
        created_by: current.id,
    })?;
    info!(evaluation_id = evaluation.id, user_id = current.id, "Evaluation created");
    Ok(Response::created(
        "Évaluation créée",
        json!({ "evaluation": evaluation }),
    ))
}

/// GET /evaluations/:id
pub fn show(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let policy = EvaluationPolicy::for_user(&current);
    let evaluation = load_evaluation(state, req.param_id("id")?)?;
    let matiere = load_matiere(state, evaluation.matiere_id)?;
    if !policy.can_view(&evaluation, &matiere) {
        return Err(AppError::AuthorizationDenied);
    }
    Ok(Response::success(
        "Évaluation",
        json!({ "evaluation": policy.project(&evaluation), "matiere": matiere }),
    ))
}

/// PUT /evaluations/:id - Partial update
pub fn update(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let evaluation = load_evaluation(state, req.param_id("id")?)?;
    let matiere = load_matiere(state, evaluation.matiere_id)?;
    if !EvaluationPolicy::for_user(&current).can_edit(&matiere) {
        return Err(AppError::AuthorizationDenied);
    }

    let input: EvaluationRequest = req.payload()?;
    let mut v = Validator::new();
    let fields = check_fields(&mut v, &input, true);
    if let Some(note_max) = fields.note_max {
        if evaluation.notes.iter().any(|n| n.valeur > note_max) {
            v.add("note_max", "Des notes existantes dépassent ce barème");
        }
    }
    v.finish()?;

    let updated = state.store.update_evaluation(evaluation.id, |e| {
        if let Some(titre) = fields.titre {
            e.titre = titre;
        }
        if let Some(kind) = fields.kind {
            e.kind = kind;
        }
        if let Some(date) = fields.date {
            e.date = date;
        }
        if let Some(coefficient) = fields.coefficient {
            e.coefficient = coefficient;
        }
        if let Some(note_max) = fields.note_max {
            e.note_max = note_max;
        }
    })?;
    Ok(Response::success(
        "Évaluation mise à jour",
        json!({ "evaluation": updated }),
    ))
}

/// DELETE /evaluations/:id
pub fn destroy(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    if !EvaluationPolicy::for_user(&current).can_delete() {
        return Err(AppError::AuthorizationDenied);
    }
    let id = req.param_id("id")?;
    state.store.delete_evaluation(id)?;
    info!(evaluation_id = id, user_id = current.id, "Evaluation deleted");
    Ok(Response::message("Évaluation supprimée"))
}

/// POST /evaluations/:id/notes - Record or replace notes
///
/// The whole batch is rejected if any entry fails; errors are keyed
/// `notes.{index}.{field}`.
pub fn grade(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let evaluation = load_evaluation(state, req.param_id("id")?)?;
    let matiere = load_matiere(state, evaluation.matiere_id)?;
    if !EvaluationPolicy::for_user(&current).can_edit(&matiere) {
        return Err(AppError::AuthorizationDenied);
    }

    let input: NotesRequest = req.payload()?;
    let mut v = Validator::new();
    if input.notes.is_empty() {
        v.add("notes", "Au moins une note est requise");
    }

    let now = Utc::now();
    let mut notes = Vec::with_capacity(input.notes.len());
    for (i, entry) in input.notes.iter().enumerate() {
        let etudiant = format!("notes.{i}.etudiant_id");
        let valeur = format!("notes.{i}.valeur");
        match entry.etudiant_id {
            None => v.add(&etudiant, format!("Le champ {etudiant} est requis")),
            Some(id) if !matiere.has_student(id) => {
                v.add(&etudiant, "Étudiant non inscrit à cette matière")
            }
            Some(_) => {}
        }
        match entry.valeur {
            None => v.add(&valeur, format!("Le champ {valeur} est requis")),
            Some(value) => v.range(&valeur, value, 0.0, evaluation.note_max),
        }
        let commentaire = entry
            .commentaire
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if let Some(c) = commentaire {
            v.max_len(&format!("notes.{i}.commentaire"), c, 500);
        }
        if let (Some(etudiant_id), Some(valeur)) = (entry.etudiant_id, entry.valeur) {
            notes.push(Note {
                etudiant_id,
                valeur,
                commentaire: commentaire.map(str::to_string),
                updated_at: now,
            });
        }
    }
    v.finish()?;

    let count = notes.len();
    let updated = state.store.update_evaluation(evaluation.id, |e| {
        for note in notes {
            e.set_note(note);
        }
    })?;
    info!(evaluation_id = updated.id, count, "Notes recorded");
    Ok(Response::success(
        "Notes enregistrées",
        json!({ "evaluation": updated }),
    ))
}
