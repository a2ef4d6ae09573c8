//! Per-role landing data.

use serde::Serialize;
use serde_json::json;

use super::actor;
use crate::error::HandlerResult;
use crate::http::{Request, Response};
use crate::models::{Evaluation, Matiere, MatiereId};
use crate::state::AppState;

const RECENT: usize = 5;

/// Note scaled to a mark out of 20
fn on_twenty(valeur: f64, note_max: f64) -> f64 {
    if note_max > 0.0 {
        valeur / note_max * 20.0
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
struct EvaluationSummary {
    id: i64,
    titre: String,
    matiere_id: MatiereId,
    date: chrono::NaiveDate,
    notes: usize,
    moyenne: Option<f64>,
}

impl EvaluationSummary {
    fn of(e: &Evaluation) -> Self {
        let moyenne = (!e.notes.is_empty()).then(|| {
            let total: f64 = e.notes.iter().map(|n| n.valeur).sum();
            round2(total / e.notes.len() as f64)
        });
        Self {
            id: e.id,
            titre: e.titre.clone(),
            matiere_id: e.matiere_id,
            date: e.date,
            notes: e.notes.len(),
            moyenne,
        }
    }
}

#[derive(Debug, Serialize)]
struct Bulletin {
    matiere_id: MatiereId,
    code: String,
    nom: String,
    notes: Vec<BulletinLine>,
    /// Coefficient-weighted, out of 20
    moyenne: Option<f64>,
}

#[derive(Debug, Serialize)]
struct BulletinLine {
    evaluation_id: i64,
    titre: String,
    valeur: f64,
    note_max: f64,
    coefficient: f64,
}

impl Bulletin {
    fn of(matiere: &Matiere, evaluations: &[Evaluation], etudiant_id: i64) -> Self {
        let notes: Vec<BulletinLine> = evaluations
            .iter()
            .filter(|e| e.matiere_id == matiere.id)
            .filter_map(|e| {
                e.note_for(etudiant_id).map(|n| BulletinLine {
                    evaluation_id: e.id,
                    titre: e.titre.clone(),
                    valeur: n.valeur,
                    note_max: e.note_max,
                    coefficient: e.coefficient,
                })
            })
            .collect();

        let weight: f64 = notes.iter().map(|l| l.coefficient).sum();
        let moyenne = (weight > 0.0).then(|| {
            let total: f64 = notes
                .iter()
                .map(|l| on_twenty(l.valeur, l.note_max) * l.coefficient)
                .sum();
            round2(total / weight)
        });

        Self {
            matiere_id: matiere.id,
            code: matiere.code.clone(),
            nom: matiere.nom.clone(),
            notes,
            moyenne,
        }
    }
}

/// GET /admin/dashboard
pub fn admin(state: &AppState, _req: &mut Request) -> HandlerResult {
    let recent: Vec<EvaluationSummary> = state
        .store
        .list_evaluations()
        .iter()
        .take(RECENT)
        .map(EvaluationSummary::of)
        .collect();
    Ok(Response::success(
        "Tableau de bord administrateur",
        json!({ "counts": state.store.counts(), "recent_evaluations": recent }),
    ))
}

/// GET /professor/dashboard
pub fn professor(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let matieres: Vec<Matiere> = state
        .store
        .list_matieres()
        .into_iter()
        .filter(|m| current.is_admin || m.is_taught_by(current.id))
        .collect();
    let evaluations: Vec<EvaluationSummary> = state
        .store
        .list_evaluations()
        .iter()
        .filter(|e| matieres.iter().any(|m| m.id == e.matiere_id))
        .map(EvaluationSummary::of)
        .collect();
    let students: usize = matieres.iter().map(|m| m.etudiants.len()).sum();
    let pending = evaluations.iter().filter(|e| e.notes == 0).count();

    Ok(Response::success(
        "Tableau de bord professeur",
        json!({
            "matieres": matieres.len(),
            "etudiants": students,
            "evaluations": evaluations.len(),
            "evaluations_sans_note": pending,
            "recent_evaluations": evaluations.iter().take(RECENT).collect::<Vec<_>>(),
        }),
    ))
}

/// GET /student/dashboard
pub fn student(state: &AppState, req: &mut Request) -> HandlerResult {
    let current = actor(req)?;
    let evaluations = state.store.list_evaluations();
    let bulletins: Vec<Bulletin> = state
        .store
        .list_matieres()
        .iter()
        .filter(|m| m.has_student(current.id))
        .map(|m| Bulletin::of(m, &evaluations, current.id))
        .collect();

    let graded: Vec<f64> = bulletins.iter().filter_map(|b| b.moyenne).collect();
    let moyenne_generale =
        (!graded.is_empty()).then(|| round2(graded.iter().sum::<f64>() / graded.len() as f64));

    Ok(Response::success(
        "Tableau de bord étudiant",
        json!({ "matieres": bulletins, "moyenne_generale": moyenne_generale }),
    ))
}
