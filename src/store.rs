//!
//! praxis credential store
//! -----------------------
//! This module implements the shared store for users, medical practices and
//! registration tokens. All state sits behind a single `parking_lot::RwLock`
//! so the two multi-entity writes the service needs are transactional:
//!
//! - Registration creates user + practice + token as one unit; a concurrent
//!   reader never observes a practice without its master user or a pending
//!   user without its token.
//! - Conversion performs check-unconsumed -> mark-consumed as one serialized
//!   read-modify-write, so concurrent conversions of the same token have
//!   exactly one winner.
//!
//! The public API centers around `CredentialStore`, a cheap-to-clone handle
//! (`Arc` inside) shared across request handlers. No caller ever caches user
//! or token state; every check re-reads under the lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Created by registration, no password yet; cannot authenticate.
    Pending,
    /// Converted via a registration token; password hash set.
    Active,
}

/// Audience of a registration token. Decides which permissions the user is
/// granted when the token is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationKind {
    MedicalPracticeAdministrator,
    Gp,
    Patient,
    HeadPharmacist,
    Pharmacist,
    PharmacyTechnician,
}

impl RegistrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationKind::MedicalPracticeAdministrator => "MEDICAL_PRACTICE_ADMINISTRATOR",
            RegistrationKind::Gp => "GP",
            RegistrationKind::Patient => "PATIENT",
            RegistrationKind::HeadPharmacist => "HEAD_PHARMACIST",
            RegistrationKind::Pharmacist => "PHARMACIST",
            RegistrationKind::PharmacyTechnician => "PHARMACY_TECHNICIAN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MEDICAL_PRACTICE_ADMINISTRATOR" => Some(RegistrationKind::MedicalPracticeAdministrator),
            "GP" => Some(RegistrationKind::Gp),
            "PATIENT" => Some(RegistrationKind::Patient),
            "HEAD_PHARMACIST" => Some(RegistrationKind::HeadPharmacist),
            "PHARMACIST" => Some(RegistrationKind::Pharmacist),
            "PHARMACY_TECHNICIAN" => Some(RegistrationKind::PharmacyTechnician),
            _ => None,
        }
    }

    /// Permissions granted when a token of this kind converts.
    pub fn default_permissions(&self) -> HashSet<String> {
        let names: &[&str] = match self {
            RegistrationKind::MedicalPracticeAdministrator => &[
                "practices.all",
                "practice.register-gps",
                "practice.register-patients",
            ],
            RegistrationKind::Gp => &["practice.register-patients", "prescriptions.issue"],
            RegistrationKind::Patient => &["prescriptions.own"],
            RegistrationKind::HeadPharmacist => &["pharmacy.register-pharmacists", "prescriptions.dispense"],
            RegistrationKind::Pharmacist => &["prescriptions.dispense"],
            RegistrationKind::PharmacyTechnician => &["prescriptions.prepare"],
        };
        names.iter().map(|s| s.to_string()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: Uuid,
    pub username: String,
    pub name: String,
    pub email: String,
    /// None until the pending user converts.
    pub password_hash: Option<String>,
    pub status: UserStatus,
    #[serde(default)]
    pub permissions: HashSet<String>,
    /// Institution the user belongs to.
    pub practice_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalPractice {
    pub practice_id: Uuid,
    pub name: String,
    pub address_line_1: String,
    pub address_line_2: String,
    #[serde(default)]
    pub address_line_3: Option<String>,
    #[serde(default)]
    pub address_line_4: Option<String>,
    pub city: String,
    pub state: String,
    pub postcode: String,
    /// The pending/active user administering this practice.
    pub master_user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationToken {
    /// UUID string, exact-match key for conversion.
    pub token_id: String,
    pub user_id: Uuid,
    pub kind: RegistrationKind,
    pub consumed: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    /// username -> user id, the uniqueness index across pending and active.
    username_index: HashMap<String, Uuid>,
    practices: HashMap<Uuid, MedicalPractice>,
    tokens: HashMap<String, RegistrationToken>,
}

/// Shared handle to the credential store.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Inner>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic registration write for a new practice: pending user, practice
    /// and token land together or not at all.
    pub fn create_practice_registration(
        &self,
        user: User,
        practice: MedicalPractice,
        token: RegistrationToken,
    ) -> AppResult<()> {
        let mut inner = self.inner.write();
        if inner.username_index.contains_key(&user.username) {
            return Err(AppError::duplicate("User already exists"));
        }
        debug!(target: "praxis::store", "registering practice '{}' with master user '{}'", practice.name, user.username);
        inner.username_index.insert(user.username.clone(), user.user_id);
        inner.tokens.insert(token.token_id.clone(), token);
        inner.practices.insert(practice.practice_id, practice);
        inner.users.insert(user.user_id, user);
        Ok(())
    }

    /// Atomic registration write for a new member of an existing practice.
    pub fn create_member_registration(
        &self,
        practice_id: Uuid,
        user: User,
        token: RegistrationToken,
    ) -> AppResult<()> {
        let mut inner = self.inner.write();
        if !inner.practices.contains_key(&practice_id) {
            return Err(AppError::not_found("Practice not found"));
        }
        if inner.username_index.contains_key(&user.username) {
            return Err(AppError::duplicate("User already exists"));
        }
        debug!(target: "praxis::store", "registering member '{}' for practice {}", user.username, practice_id);
        inner.username_index.insert(user.username.clone(), user.user_id);
        inner.tokens.insert(token.token_id.clone(), token);
        inner.users.insert(user.user_id, user);
        Ok(())
    }

    /// One-shot pending -> active conversion keyed by token.
    ///
    /// The whole sequence (token unconsumed/unexpired check, user pending
    /// check, password set, status flip, permission grant, consume) runs under
    /// the write lock, so the consumed flag acts as a compare-and-set: of N
    /// concurrent calls with the same token exactly one returns Ok, the rest
    /// observe `consumed` and get InvalidToken.
    pub fn convert_pending(
        &self,
        token_id: &str,
        now: DateTime<Utc>,
        password_hash: String,
    ) -> AppResult<Uuid> {
        let mut inner = self.inner.write();
        let (user_id, kind) = {
            let Some(token) = inner.tokens.get(token_id) else {
                return Err(AppError::invalid_token("Registration token invalid"));
            };
            if token.consumed {
                return Err(AppError::invalid_token("Registration token invalid"));
            }
            if now >= token.expires_at {
                return Err(AppError::invalid_token("Registration token invalid"));
            }
            (token.user_id, token.kind)
        };
        match inner.users.get(&user_id).map(|u| u.status) {
            Some(UserStatus::Pending) => {}
            _ => return Err(AppError::invalid_state("User is not pending conversion")),
        }
        // Point of no return: mutate token and user together.
        if let Some(token) = inner.tokens.get_mut(token_id) {
            token.consumed = true;
        }
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::invalid_state("User is not pending conversion"))?;
        user.password_hash = Some(password_hash);
        user.status = UserStatus::Active;
        user.permissions.extend(kind.default_permissions());
        debug!(target: "praxis::store", "converted pending user '{}' via token", user.username);
        Ok(user_id)
    }

    pub fn get_user(&self, user_id: Uuid) -> Option<User> {
        self.inner.read().users.get(&user_id).cloned()
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<User> {
        let inner = self.inner.read();
        let id = inner.username_index.get(username)?;
        inner.users.get(id).cloned()
    }

    pub fn get_token(&self, token_id: &str) -> Option<RegistrationToken> {
        self.inner.read().tokens.get(token_id).cloned()
    }

    pub fn token_for_user(&self, user_id: Uuid) -> Option<RegistrationToken> {
        self.inner
            .read()
            .tokens
            .values()
            .find(|t| t.user_id == user_id)
            .cloned()
    }

    pub fn get_practice(&self, practice_id: Uuid) -> Option<MedicalPractice> {
        self.inner.read().practices.get(&practice_id).cloned()
    }

    pub fn list_practices(&self) -> Vec<MedicalPractice> {
        let mut all: Vec<MedicalPractice> = self.inner.read().practices.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn grant_permission(&self, user_id: Uuid, permission: &str) -> AppResult<()> {
        let mut inner = self.inner.write();
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found("User not found"))?;
        user.permissions.insert(permission.to_string());
        Ok(())
    }

    /// Seed an initial active operator ("praxis"/"praxis", wildcard permission)
    /// when the store starts empty, so a fresh deployment can create its first
    /// practice. Idempotent.
    pub fn ensure_default_admin(&self) -> anyhow::Result<()> {
        if self.get_user_by_username("praxis").is_some() {
            return Ok(());
        }
        let hash = crate::security::hash_password("praxis")?;
        let user = User {
            user_id: Uuid::new_v4(),
            username: "praxis".to_string(),
            name: "Praxis Operator".to_string(),
            email: "operator@praxis.local".to_string(),
            password_hash: Some(hash),
            status: UserStatus::Active,
            permissions: HashSet::from(["*".to_string()]),
            practice_id: None,
        };
        let mut inner = self.inner.write();
        inner.username_index.insert(user.username.clone(), user.user_id);
        inner.users.insert(user.user_id, user);
        Ok(())
    }
}
