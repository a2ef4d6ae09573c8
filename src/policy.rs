//! Role-based access rules for matières and evaluations.
//!
//! One policy type, parameterized by the caller's access level, answers
//! every visibility and edit question so controllers stay role-agnostic.

use crate::models::{roles, Evaluation, Matiere};
use crate::session::AuthenticatedUser;

/// What a user may reach, derived from role and admin flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Administrators: everything
    Full,
    /// Professors: matières they teach
    Teaching,
    /// Students: matières they are enrolled in, own notes only
    Enrolled,
    None,
}

impl Access {
    pub fn of(user: &AuthenticatedUser) -> Self {
        if user.is_admin {
            return Access::Full;
        }
        match user.role.as_str() {
            roles::ADMIN => Access::Full,
            roles::PROFESSOR => Access::Teaching,
            roles::STUDENT => Access::Enrolled,
            _ => Access::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EvaluationPolicy<'a> {
    user: &'a AuthenticatedUser,
    access: Access,
}

impl<'a> EvaluationPolicy<'a> {
    pub fn for_user(user: &'a AuthenticatedUser) -> Self {
        Self {
            user,
            access: Access::of(user),
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn can_view_matiere(&self, matiere: &Matiere) -> bool {
        match self.access {
            Access::Full => true,
            Access::Teaching => matiere.is_taught_by(self.user.id),
            Access::Enrolled => matiere.has_student(self.user.id),
            Access::None => false,
        }
    }

    pub fn can_view(&self, evaluation: &Evaluation, matiere: &Matiere) -> bool {
        match self.access {
            Access::Teaching => {
                matiere.is_taught_by(self.user.id) || evaluation.created_by == self.user.id
            }
            _ => self.can_view_matiere(matiere),
        }
    }

    /// Create evaluations in `matiere`
    pub fn can_create_in(&self, matiere: &Matiere) -> bool {
        match self.access {
            Access::Full => true,
            Access::Teaching => matiere.is_taught_by(self.user.id),
            Access::Enrolled | Access::None => false,
        }
    }

    /// Edit the evaluation or record notes on it
    pub fn can_edit(&self, matiere: &Matiere) -> bool {
        self.can_create_in(matiere)
    }

    pub fn can_delete(&self) -> bool {
        self.access == Access::Full
    }

    /// Copy of the evaluation trimmed to what this user may see
    pub fn project(&self, evaluation: &Evaluation) -> Evaluation {
        let mut visible = evaluation.clone();
        if self.access == Access::Enrolled {
            visible.notes.retain(|n| n.etudiant_id == self.user.id);
        }
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EvaluationKind, Note};
    use chrono::{NaiveDate, Utc};

    fn user(id: i64, role: &str, is_admin: bool) -> AuthenticatedUser {
        AuthenticatedUser {
            id,
            email: format!("{id}@ecole.local"),
            nom: "N".into(),
            prenom: "P".into(),
            role: role.into(),
            role_id: 0,
            is_admin,
        }
    }

    fn matiere() -> Matiere {
        Matiere {
            id: 10,
            code: "MATH".into(),
            nom: "Maths".into(),
            description: None,
            professeur_id: Some(2),
            etudiants: vec![3, 4],
            created_at: Utc::now(),
        }
    }

    fn evaluation() -> Evaluation {
        let note = |etudiant_id| Note {
            etudiant_id,
            valeur: 12.0,
            commentaire: None,
            updated_at: Utc::now(),
        };
        Evaluation {
            id: 20,
            matiere_id: 10,
            titre: "DS".into(),
            kind: EvaluationKind::Controle,
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            coefficient: 1.0,
            note_max: 20.0,
            notes: vec![note(3), note(4)],
            created_by: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn professor_edits_only_own_matieres() {
        let own = user(2, "professor", false);
        let other = user(9, "professor", false);
        assert!(EvaluationPolicy::for_user(&own).can_edit(&matiere()));
        assert!(!EvaluationPolicy::for_user(&other).can_edit(&matiere()));
        assert!(!EvaluationPolicy::for_user(&own).can_delete());
    }

    #[test]
    fn student_sees_only_own_note() {
        let student = user(3, "student", false);
        let policy = EvaluationPolicy::for_user(&student);
        assert!(policy.can_view(&evaluation(), &matiere()));
        let visible = policy.project(&evaluation());
        assert_eq!(visible.notes.len(), 1);
        assert_eq!(visible.notes[0].etudiant_id, 3);

        let outsider = user(7, "student", false);
        assert!(!EvaluationPolicy::for_user(&outsider).can_view(&evaluation(), &matiere()));
    }

    #[test]
    fn admin_flag_grants_full_access() {
        let admin = user(1, "professor", true);
        let policy = EvaluationPolicy::for_user(&admin);
        assert_eq!(policy.access(), Access::Full);
        assert!(policy.can_delete());
        assert_eq!(policy.project(&evaluation()).notes.len(), 2);
    }
}
