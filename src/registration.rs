//! Registration manager: pending-user onboarding and one-time conversion.
//! Creating a practice creates its master user (pending, no password), the
//! practice record and a single-use registration token as one store unit,
//! then hands the signup link to the mailer without waiting on it. Conversion
//! is the only path from Pending to Active and consumes the token forever.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::mail::{dispatch_signup, signup_url, EmailTemplate, Mailer};
use crate::store::{
    CredentialStore, MedicalPractice, RegistrationKind, RegistrationToken, User, UserStatus,
};

/// Master/member user details supplied at registration. No password here: a
/// password is only ever set at conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPractice {
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
}

fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("Field '{}' is required", field)));
    }
    Ok(())
}

fn validate_new_user(user: &NewUser) -> AppResult<()> {
    require("username", &user.username)?;
    require("name", &user.name)?;
    require("email", &user.email)?;
    Ok(())
}

fn validate_new_practice(practice: &NewPractice) -> AppResult<()> {
    require("name", &practice.name)?;
    require("address_line_1", &practice.address_line_1)?;
    require("address_line_2", &practice.address_line_2)?;
    require("city", &practice.city)?;
    require("state", &practice.state)?;
    require("postcode", &practice.postcode)?;
    Ok(())
}

#[derive(Clone)]
pub struct RegistrationManager {
    store: CredentialStore,
    mailer: Arc<dyn Mailer>,
    front_end_base_url: String,
    token_ttl: Duration,
}

impl RegistrationManager {
    pub fn new(
        store: CredentialStore,
        mailer: Arc<dyn Mailer>,
        front_end_base_url: String,
        token_ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            mailer,
            front_end_base_url,
            token_ttl: Duration::hours(token_ttl_hours),
        }
    }

    fn pending_user(&self, details: &NewUser, practice_id: Option<Uuid>) -> User {
        User {
            user_id: Uuid::new_v4(),
            username: details.username.clone(),
            name: details.name.clone(),
            email: details.email.clone(),
            password_hash: None,
            status: UserStatus::Pending,
            permissions: Default::default(),
            practice_id,
        }
    }

    fn issue_token(&self, user_id: Uuid, kind: RegistrationKind) -> RegistrationToken {
        let now = Utc::now();
        RegistrationToken {
            token_id: crate::token::new_registration_token(),
            user_id,
            kind,
            consumed: false,
            issued_at: now,
            expires_at: now + self.token_ttl,
        }
    }

    fn hand_off_mail(&self, user: &User, kind: RegistrationKind, token_id: &str) {
        let url = signup_url(&self.front_end_base_url, token_id);
        dispatch_signup(
            Arc::clone(&self.mailer),
            user.email.clone(),
            user.name.clone(),
            EmailTemplate::for_kind(kind),
            url,
        );
    }

    /// Create a practice, its pending master user and the registration token
    /// as one atomic unit, then notify the holder. Returns both identifiers.
    pub fn register_practice(
        &self,
        practice: NewPractice,
        master_user: NewUser,
    ) -> AppResult<(Uuid, Uuid)> {
        info!(target: "praxis::registration", "request made to create medical practice {}", practice.name);
        validate_new_practice(&practice)?;
        validate_new_user(&master_user)?;

        let kind = RegistrationKind::MedicalPracticeAdministrator;
        let practice_id = Uuid::new_v4();
        let user = self.pending_user(&master_user, Some(practice_id));
        let record = MedicalPractice {
            practice_id,
            name: practice.name,
            address_line_1: practice.address_line_1,
            address_line_2: practice.address_line_2,
            address_line_3: practice.address_line_3,
            address_line_4: practice.address_line_4,
            city: practice.city,
            state: practice.state,
            postcode: practice.postcode,
            master_user_id: user.user_id,
        };
        let token = self.issue_token(user.user_id, kind);
        let token_id = token.token_id.clone();

        self.store
            .create_practice_registration(user.clone(), record, token)?;
        debug!(target: "praxis::registration", "created practice with id {}", practice_id);

        // The registration is committed; mail delivery must not undo it.
        self.hand_off_mail(&user, kind, &token_id);
        Ok((practice_id, user.user_id))
    }

    /// Register a new member (GP, patient, ...) of an existing practice as a
    /// pending user with its own registration token.
    pub fn register_member(
        &self,
        practice_id: Uuid,
        member: NewUser,
        kind: RegistrationKind,
    ) -> AppResult<Uuid> {
        info!(
            target: "praxis::registration",
            "request made to add {} to medical practice {}",
            kind.as_str(),
            practice_id
        );
        validate_new_user(&member)?;

        let user = self.pending_user(&member, Some(practice_id));
        let token = self.issue_token(user.user_id, kind);
        let token_id = token.token_id.clone();

        self.store
            .create_member_registration(practice_id, user.clone(), token)?;
        self.hand_off_mail(&user, kind, &token_id);
        Ok(user.user_id)
    }

    /// Convert a pending user into a full account. Exactly one call per token
    /// can ever succeed; the consumed flag in the store is the sole arbiter.
    pub fn convert_pending_user(&self, token: &str, new_password: &str) -> AppResult<Uuid> {
        if new_password.trim().is_empty() {
            return Err(AppError::validation("Field 'password' is required"));
        }
        if !crate::token::is_valid_token_format(token) {
            info!(target: "praxis::registration", "registration token invalid");
            return Err(AppError::invalid_token("Registration token invalid"));
        }
        // Hash outside the store's critical section; losers of a concurrent
        // race pay the hashing cost but never observe partial state.
        let hash = crate::security::hash_password(new_password)
            .map_err(|e| AppError::internal(e.to_string()))?;
        let user_id = self.store.convert_pending(token, Utc::now(), hash)?;
        info!(target: "praxis::registration", "converted pending user {}", user_id);
        Ok(user_id)
    }
}
