//! In-memory repositories for users, roles, matières and evaluations.
//!
//! Data is lost on restart. Ids come from one shared sequence so they are
//! unique across entity kinds.

use crate::config::Config;
use crate::crypto::hash_password;
use crate::models::*;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Thread-safe in-memory store
#[derive(Clone)]
pub struct Store {
    roles: Arc<DashMap<RoleId, Role>>,
    users: Arc<DashMap<UserId, User>>,
    /// Lowercased email → user id
    emails: Arc<DashMap<String, UserId>>,
    matieres: Arc<DashMap<MatiereId, Matiere>>,
    /// Uppercased code → matière id
    codes: Arc<DashMap<String, MatiereId>>,
    evaluations: Arc<DashMap<EvaluationId, Evaluation>>,
    next_id: Arc<AtomicI64>,
}

/// Aggregate counters for dashboards
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreCounts {
    pub users: usize,
    pub professors: usize,
    pub students: usize,
    pub matieres: usize,
    pub evaluations: usize,
}

impl Store {
    /// Create a store holding only the built-in roles
    pub fn new() -> Self {
        let store = Self {
            roles: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            emails: Arc::new(DashMap::new()),
            matieres: Arc::new(DashMap::new()),
            codes: Arc::new(DashMap::new()),
            evaluations: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
        };
        for name in [roles::ADMIN, roles::PROFESSOR, roles::STUDENT] {
            let id = store.next_id();
            store.roles.insert(
                id,
                Role {
                    id,
                    name: name.to_string(),
                },
            );
        }
        store
    }

    /// Create a store with the built-in roles and the configured admin account
    pub fn seeded(config: &Config) -> Result<Self, StoreError> {
        let store = Self::new();
        let admin_role = store.require_role(roles::ADMIN)?;
        let password_hash =
            hash_password(&config.admin_password, config.password_hash_iterations)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        store.create_user(NewUser {
            email: config.admin_email.clone(),
            nom: "Administrateur".into(),
            prenom: "Système".into(),
            password_hash,
            role_id: admin_role.id,
            is_admin: true,
        })?;
        info!(admin = %config.admin_email, "Seeded administrator account");
        Ok(store)
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.roles.iter().map(|r| r.value().clone()).collect();
        roles.sort_by_key(|r| r.id);
        roles
    }

    pub fn find_role(&self, id: RoleId) -> Result<Option<Role>, StoreError> {
        Ok(self.roles.get(&id).map(|r| r.value().clone()))
    }

    pub fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self
            .roles
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .map(|r| r.value().clone()))
    }

    /// Role lookup that treats absence as a data integrity failure
    pub fn require_role(&self, name: &str) -> Result<Role, StoreError> {
        self.find_role_by_name(name)?
            .ok_or_else(|| StoreError::Integrity(format!("role '{name}' is missing")))
    }

    /// Name of a role id, or "unknown" for dangling references
    pub fn role_name(&self, id: RoleId) -> String {
        self.roles
            .get(&id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        if self.find_role(new.role_id)?.is_none() {
            return Err(StoreError::Integrity(format!(
                "role {} does not exist",
                new.role_id
            )));
        }

        // The slot stays locked until the user is inserted
        let email = new.email.to_lowercase();
        let slot = match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate("email".into())),
            Entry::Vacant(slot) => slot,
        };

        let now = Utc::now();
        let user = User {
            id: self.next_id(),
            email,
            nom: new.nom,
            prenom: new.prenom,
            password_hash: new.password_hash,
            role_id: new.role_id,
            is_admin: new.is_admin,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(user.id, user.clone());
        slot.insert(user.id);

        debug!(user_id = user.id, role_id = user.role_id, "Created user");
        Ok(user)
    }

    pub fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let id = self.emails.get(&email.to_lowercase()).map(|id| *id.value());
        match id {
            Some(id) => self.find_user(id),
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub fn users_with_role(&self, role_id: RoleId) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.role_id == role_id)
            .map(|u| u.value().clone())
            .collect();
        users.sort_by_key(|u| u.id);
        users
    }

    /// Apply `change` to a user; the email must stay unique
    pub fn update_user(
        &self,
        id: UserId,
        change: impl FnOnce(&mut User),
    ) -> Result<User, StoreError> {
        let mut updated = self
            .find_user(id)?
            .ok_or_else(|| StoreError::NotFound("Utilisateur".into()))?;
        let previous_email = updated.email.clone();
        change(&mut updated);
        updated.email = updated.email.to_lowercase();

        if self.find_role(updated.role_id)?.is_none() {
            return Err(StoreError::Integrity(format!(
                "role {} does not exist",
                updated.role_id
            )));
        }

        updated.updated_at = Utc::now();
        if updated.email == previous_email {
            self.users.insert(id, updated.clone());
        } else {
            match self.emails.entry(updated.email.clone()) {
                Entry::Occupied(_) => return Err(StoreError::Duplicate("email".into())),
                Entry::Vacant(slot) => {
                    self.users.insert(id, updated.clone());
                    slot.insert(id);
                }
            }
            self.emails.remove_if(&previous_email, |_, owner| *owner == id);
        }
        debug!(user_id = id, "Updated user");
        Ok(updated)
    }

    /// Delete a user, unenrolling them and removing their notes.
    ///
    /// Fails while the user still teaches a matière.
    pub fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        if self.users.get(&id).is_none() {
            return Err(StoreError::NotFound("Utilisateur".into()));
        }
        if self.matieres.iter().any(|m| m.is_taught_by(id)) {
            return Err(StoreError::Integrity(
                "user still teaches at least one matière".into(),
            ));
        }

        for mut matiere in self.matieres.iter_mut() {
            matiere.etudiants.retain(|&e| e != id);
        }
        for mut evaluation in self.evaluations.iter_mut() {
            evaluation.notes.retain(|n| n.etudiant_id != id);
        }
        if let Some((_, user)) = self.users.remove(&id) {
            self.emails.remove_if(&user.email, |_, owner| *owner == id);
        }

        debug!(user_id = id, "Deleted user");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Matières
    // ------------------------------------------------------------------

    pub fn create_matiere(&self, new: NewMatiere) -> Result<Matiere, StoreError> {
        let slot = match self.codes.entry(new.code.to_uppercase()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate("code".into())),
            Entry::Vacant(slot) => slot,
        };

        let matiere = Matiere {
            id: self.next_id(),
            code: new.code,
            nom: new.nom,
            description: new.description,
            professeur_id: new.professeur_id,
            etudiants: dedup(new.etudiants),
            created_at: Utc::now(),
        };
        self.matieres.insert(matiere.id, matiere.clone());
        slot.insert(matiere.id);

        debug!(matiere_id = matiere.id, "Created matière");
        Ok(matiere)
    }

    pub fn find_matiere(&self, id: MatiereId) -> Result<Option<Matiere>, StoreError> {
        Ok(self.matieres.get(&id).map(|m| m.value().clone()))
    }

    pub fn list_matieres(&self) -> Vec<Matiere> {
        let mut matieres: Vec<Matiere> =
            self.matieres.iter().map(|m| m.value().clone()).collect();
        matieres.sort_by_key(|m| m.id);
        matieres
    }

    pub fn update_matiere(
        &self,
        id: MatiereId,
        change: impl FnOnce(&mut Matiere),
    ) -> Result<Matiere, StoreError> {
        let mut updated = self
            .find_matiere(id)?
            .ok_or_else(|| StoreError::NotFound("Matière".into()))?;
        let previous_code = updated.code.to_uppercase();
        change(&mut updated);
        updated.etudiants = dedup(std::mem::take(&mut updated.etudiants));

        let code = updated.code.to_uppercase();
        if code == previous_code {
            self.matieres.insert(id, updated.clone());
        } else {
            match self.codes.entry(code) {
                Entry::Occupied(_) => return Err(StoreError::Duplicate("code".into())),
                Entry::Vacant(slot) => {
                    self.matieres.insert(id, updated.clone());
                    slot.insert(id);
                }
            }
            self.codes.remove_if(&previous_code, |_, owner| *owner == id);
        }
        debug!(matiere_id = id, "Updated matière");
        Ok(updated)
    }

    /// Delete a matière that has no evaluations
    pub fn delete_matiere(&self, id: MatiereId) -> Result<(), StoreError> {
        if self.matieres.get(&id).is_none() {
            return Err(StoreError::NotFound("Matière".into()));
        }
        if self.evaluations.iter().any(|e| e.matiere_id == id) {
            return Err(StoreError::Integrity(
                "matière still has evaluations".into(),
            ));
        }
        if let Some((_, matiere)) = self.matieres.remove(&id) {
            self.codes
                .remove_if(&matiere.code.to_uppercase(), |_, owner| *owner == id);
        }
        debug!(matiere_id = id, "Deleted matière");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Evaluations
    // ------------------------------------------------------------------

    pub fn create_evaluation(&self, new: NewEvaluation) -> Result<Evaluation, StoreError> {
        if self.matieres.get(&new.matiere_id).is_none() {
            return Err(StoreError::NotFound("Matière".into()));
        }

        let now = Utc::now();
        let evaluation = Evaluation {
            id: self.next_id(),
            matiere_id: new.matiere_id,
            titre: new.titre,
            kind: new.kind,
            date: new.date,
            coefficient: new.coefficient,
            note_max: new.note_max,
            notes: Vec::new(),
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        self.evaluations.insert(evaluation.id, evaluation.clone());

        debug!(
            evaluation_id = evaluation.id,
            matiere_id = evaluation.matiere_id,
            "Created evaluation"
        );
        Ok(evaluation)
    }

    pub fn find_evaluation(&self, id: EvaluationId) -> Result<Option<Evaluation>, StoreError> {
        Ok(self.evaluations.get(&id).map(|e| e.value().clone()))
    }

    pub fn list_evaluations(&self) -> Vec<Evaluation> {
        let mut evaluations: Vec<Evaluation> =
            self.evaluations.iter().map(|e| e.value().clone()).collect();
        evaluations.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        evaluations
    }

    pub fn update_evaluation(
        &self,
        id: EvaluationId,
        change: impl FnOnce(&mut Evaluation),
    ) -> Result<Evaluation, StoreError> {
        let mut entry = self
            .evaluations
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Évaluation".into()))?;
        change(entry.value_mut());
        entry.updated_at = Utc::now();
        debug!(evaluation_id = id, "Updated evaluation");
        Ok(entry.value().clone())
    }

    pub fn delete_evaluation(&self, id: EvaluationId) -> Result<(), StoreError> {
        self.evaluations
            .remove(&id)
            .map(|_| debug!(evaluation_id = id, "Deleted evaluation"))
            .ok_or_else(|| StoreError::NotFound("Évaluation".into()))
    }

    /// Aggregate counters (no per-user data)
    pub fn counts(&self) -> StoreCounts {
        let role_count = |name: &str| {
            self.find_role_by_name(name)
                .ok()
                .flatten()
                .map(|role| self.users.iter().filter(|u| u.role_id == role.id).count())
                .unwrap_or(0)
        };
        StoreCounts {
            users: self.users.len(),
            professors: role_count(roles::PROFESSOR),
            students: role_count(roles::STUDENT),
            matieres: self.matieres.len(),
            evaluations: self.evaluations.len(),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn dedup(mut ids: Vec<UserId>) -> Vec<UserId> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} introuvable")]
    NotFound(String),

    #[error("duplicate value for {0}")]
    Duplicate(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(String),
}
