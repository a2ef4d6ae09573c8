//! Data models for the evaluation backend.
//!
//! Entities are owned by the [`Store`](crate::store::Store); request bodies
//! use all-optional fields so missing values surface as field errors
//! rather than deserialization failures.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type RoleId = i64;
pub type MatiereId = i64;
pub type EvaluationId = i64;

/// Role names as stored in the roles table
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const PROFESSOR: &str = "professor";
    pub const STUDENT: &str = "student";
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub password_hash: String,
    pub role_id: RoleId,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub password_hash: String,
    pub role_id: RoleId,
    pub is_admin: bool,
}

/// Public projection of a user (never includes the password hash)
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: UserId,
    pub email: String,
    pub nom: String,
    pub prenom: String,
    pub role: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    pub fn new(user: &User, role: &str) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            nom: user.nom.clone(),
            prenom: user.prenom.clone(),
            role: role.to_string(),
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

/// Academic subject
#[derive(Debug, Clone, Serialize)]
pub struct Matiere {
    pub id: MatiereId,
    pub code: String,
    pub nom: String,
    pub description: Option<String>,
    pub professeur_id: Option<UserId>,
    pub etudiants: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Matiere {
    pub fn is_taught_by(&self, user_id: UserId) -> bool {
        self.professeur_id == Some(user_id)
    }

    pub fn has_student(&self, user_id: UserId) -> bool {
        self.etudiants.contains(&user_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewMatiere {
    pub code: String,
    pub nom: String,
    pub description: Option<String>,
    pub professeur_id: Option<UserId>,
    pub etudiants: Vec<UserId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationKind {
    Examen,
    Controle,
    Projet,
    Tp,
    Oral,
}

impl EvaluationKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "examen" => Some(Self::Examen),
            "controle" => Some(Self::Controle),
            "projet" => Some(Self::Projet),
            "tp" => Some(Self::Tp),
            "oral" => Some(Self::Oral),
            _ => None,
        }
    }
}

/// A student's grade on one evaluation
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub etudiant_id: UserId,
    pub valeur: f64,
    pub commentaire: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Gradable assessment tied to one matière
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub id: EvaluationId,
    pub matiere_id: MatiereId,
    pub titre: String,
    #[serde(rename = "type")]
    pub kind: EvaluationKind,
    pub date: NaiveDate,
    pub coefficient: f64,
    pub note_max: f64,
    pub notes: Vec<Note>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn note_for(&self, etudiant_id: UserId) -> Option<&Note> {
        self.notes.iter().find(|n| n.etudiant_id == etudiant_id)
    }

    /// Insert or replace a student's note
    pub fn set_note(&mut self, note: Note) {
        match self
            .notes
            .iter_mut()
            .find(|n| n.etudiant_id == note.etudiant_id)
        {
            Some(existing) => *existing = note,
            None => self.notes.push(note),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewEvaluation {
    pub matiere_id: MatiereId,
    pub titre: String,
    pub kind: EvaluationKind,
    pub date: NaiveDate,
    pub coefficient: f64,
    pub note_max: f64,
    pub created_by: UserId,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub new_password_confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub nom: Option<String>,
    pub prenom: Option<String>,
    pub role: Option<String>,
    pub is_admin: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MatiereRequest {
    pub code: Option<String>,
    pub nom: Option<String>,
    pub description: Option<String>,
    pub professeur_id: Option<UserId>,
    pub etudiants: Option<Vec<UserId>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EvaluationRequest {
    pub matiere_id: Option<MatiereId>,
    pub titre: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub date: Option<String>,
    pub coefficient: Option<f64>,
    pub note_max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotesRequest {
    pub notes: Vec<NoteRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NoteRequest {
    pub etudiant_id: Option<UserId>,
    pub valeur: Option<f64>,
    pub commentaire: Option<String>,
}
