//! Two-tier request authorization: identity first, permissions second.
//! `SessionAuthenticator` proves "a valid, active identity made this request"
//! and nothing more. `PermissionAuthorizer` composes over it and adds a
//! set-difference check against a statically declared requirement list. The
//! authorizer holds no per-operation table; each protected endpoint supplies
//! its own `RequiredPermissions` value at wiring time.

use std::collections::HashSet;

use tracing::debug;

use super::principal::Principal;
use super::session::SessionManager;
use crate::error::{AppError, AppResult};
use crate::store::{CredentialStore, UserStatus};

/// Permission names a user may hold. `*` grants everything.
pub const WILDCARD_PERMISSION: &str = "*";

/// Immutable per-endpoint requirement list, fixed at wiring time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredPermissions(Vec<String>);

impl RequiredPermissions {
    pub fn new<S: Into<String>, I: IntoIterator<Item = S>>(names: I) -> Self {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }
}

/// Minimum-privilege check: resolves a bearer token to an active identity.
#[derive(Clone)]
pub struct SessionAuthenticator {
    store: CredentialStore,
    sessions: SessionManager,
}

impl SessionAuthenticator {
    pub fn new(store: CredentialStore, sessions: SessionManager) -> Self {
        Self { store, sessions }
    }

    /// Resolve `token` to a principal or fail Unauthenticated. The user's
    /// status and permissions come from the store on every call, so a
    /// pending user is rejected even if it somehow holds a session token.
    pub fn authenticate(&self, token: &str) -> AppResult<Principal> {
        let unauthenticated = || AppError::unauthenticated("Could not validate credentials");
        if token.is_empty() {
            return Err(unauthenticated());
        }
        let user_id = self.sessions.validate(token).ok_or_else(unauthenticated)?;
        let user = self.store.get_user(user_id).ok_or_else(unauthenticated)?;
        if user.status != UserStatus::Active {
            debug!(target: "praxis::auth", "token resolves to non-active user {}", user.username);
            return Err(unauthenticated());
        }
        Ok(Principal {
            user_id: user.user_id,
            username: user.username,
            permissions: user.permissions,
            practice_id: user.practice_id,
        })
    }
}

/// Identity + permission check, composed over the authenticator.
#[derive(Clone)]
pub struct PermissionAuthorizer {
    authenticator: SessionAuthenticator,
}

impl PermissionAuthorizer {
    pub fn new(authenticator: SessionAuthenticator) -> Self {
        Self { authenticator }
    }

    pub fn authenticator(&self) -> &SessionAuthenticator {
        &self.authenticator
    }

    /// Authenticate, then require every named permission. Unauthenticated
    /// propagates unchanged; a shortfall fails Forbidden naming what is
    /// missing. The wildcard permission bypasses the difference check.
    pub fn check(&self, token: &str, required: &RequiredPermissions) -> AppResult<Principal> {
        let principal = self.authenticator.authenticate(token)?;
        if required.is_empty() {
            return Ok(principal);
        }
        debug!(
            target: "praxis::auth",
            "{} permissions found for user {}",
            principal.permissions.len(),
            principal.username
        );
        if principal.has_permission(WILDCARD_PERMISSION) {
            debug!(target: "praxis::auth", "user {} has wildcard permission, bypassing", principal.username);
            return Ok(principal);
        }
        let missing: Vec<String> = required
            .names()
            .iter()
            .filter(|name| !principal.permissions.contains(*name))
            .cloned()
            .collect();
        if !missing.is_empty() {
            debug!(
                target: "praxis::auth",
                "user {} does not have permissions {:?}",
                principal.username, missing
            );
            return Err(AppError::forbidden("Unauthorized.", missing));
        }
        Ok(principal)
    }
}

/// Set difference `required - held`, exposed for callers that only need the
/// computation.
pub fn missing_permissions(required: &RequiredPermissions, held: &HashSet<String>) -> Vec<String> {
    if held.contains(WILDCARD_PERMISSION) {
        return Vec::new();
    }
    required
        .names()
        .iter()
        .filter(|name| !held.contains(*name))
        .cloned()
        .collect()
}
