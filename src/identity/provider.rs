// Keep provider request/response plain Rust structs; the wire shapes live in
// the HTTP layer.
use tracing::{debug, info};

use super::session::{Session, SessionManager};
use crate::error::{AppError, AppResult};
use crate::store::{CredentialStore, UserStatus};

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResponse {
    pub session: Session,
}

/// Verify a username/password pair against the credential store and issue a
/// bearer session. Every failure mode (unknown user, pending user without a
/// hash, wrong password) collapses into the same Unauthenticated error so the
/// response does not leak which part failed.
pub fn login(
    store: &CredentialStore,
    sessions: &SessionManager,
    req: &LoginRequest,
) -> AppResult<LoginResponse> {
    debug!(target: "praxis::auth", "authenticating {}", req.username);
    let Some(user) = store.get_user_by_username(&req.username) else {
        debug!(target: "praxis::auth", "username not found for {}", req.username);
        return Err(AppError::unauthenticated("Unauthorized."));
    };
    if user.status != UserStatus::Active {
        debug!(target: "praxis::auth", "user {} is not active", req.username);
        return Err(AppError::unauthenticated("Unauthorized."));
    }
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(AppError::unauthenticated("Unauthorized."));
    };
    if !crate::security::verify_password(hash, &req.password) {
        return Err(AppError::unauthenticated("Unauthorized."));
    }
    let session = sessions.issue(user.user_id);
    info!(target: "praxis::auth", "auth.login user={}", user.username);
    Ok(LoginResponse { session })
}
