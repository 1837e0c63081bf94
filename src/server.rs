//!
//! praxis HTTP server
//! ------------------
//! This module defines the Axum-based HTTP API for the registration and
//! authorization service.
//!
//! Responsibilities:
//! - Login endpoint exchanging username/password for a bearer session token.
//! - Practice registration and member registration endpoints, each guarded by
//!   its statically declared permission list.
//! - The one-time pending-user conversion endpoint.
//! - Translation of terminal authorization states to HTTP statuses:
//!   Unauthenticated -> 401, Forbidden -> 403, never conflated.
//!
//! Each protected route declares the check it needs at wiring time: identity
//! only (`authenticate`) or identity plus permissions (`check`). Handlers hold
//! no authorization knowledge beyond that declaration.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::identity::{
    login, LoginRequest, PermissionAuthorizer, RequiredPermissions, SessionAuthenticator,
    SessionManager,
};
use crate::mail::{Mailer, TracingMailer};
use crate::registration::{NewPractice, NewUser, RegistrationManager};
use crate::store::{CredentialStore, RegistrationKind};

// Per-endpoint permission requirements, fixed at wiring time.
static CREATE_PRACTICE_PERMISSIONS: Lazy<RequiredPermissions> =
    Lazy::new(|| RequiredPermissions::new(["practices.create"]));
static LIST_PRACTICES_PERMISSIONS: Lazy<RequiredPermissions> =
    Lazy::new(|| RequiredPermissions::new(["practices.all"]));

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: CredentialStore,
    pub sessions: SessionManager,
    pub registration: RegistrationManager,
    pub authorizer: PermissionAuthorizer,
}

impl AppState {
    pub fn new(config: &Config, mailer: Arc<dyn Mailer>) -> Self {
        let store = CredentialStore::new();
        let sessions = SessionManager::with_ttl(std::time::Duration::from_secs(
            config.session_ttl_minutes * 60,
        ));
        let registration = RegistrationManager::new(
            store.clone(),
            mailer,
            config.front_end_base_url.clone(),
            config.registration_token_ttl_hours,
        );
        let authorizer =
            PermissionAuthorizer::new(SessionAuthenticator::new(store.clone(), sessions.clone()));
        Self { store, sessions, registration, authorizer }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Json(json!({"message": "ok"})) }))
        .route("/token", post(token_handler))
        .route("/logout", post(logout_handler))
        .route("/users/me", get(me_handler))
        .route("/medical-practices", post(create_practice).get(list_practices))
        .route("/medical-practices/{practice_id}", get(get_practice))
        .route("/medical-practices/register/{entity}", post(register_member))
        .route("/pending-users/convert", post(convert_pending_user))
        .with_state(state)
}

/// Start the HTTP server with the given configuration.
pub async fn run_with_config(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(&config, Arc::new(TracingMailer));
    // A fresh store has nobody who could create the first practice.
    state.store.ensure_default_admin()?;
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Convenience entry point reading configuration from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(Config::from_env()).await
}

fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .unwrap_or("")
        .to_string()
}

fn error_response(err: AppError) -> (StatusCode, Json<serde_json::Value>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = json!({"status": "error", "error": err.code_str(), "detail": err.message()});
    if let AppError::Forbidden { missing, .. } = &err {
        if !missing.is_empty() {
            body["missing_permissions"] = json!(missing);
        }
    }
    if matches!(err, AppError::Internal { .. } | AppError::Persistence { .. }) {
        error!("request failed: {}", err);
    }
    (status, Json(body))
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    username: String,
    password: String,
}

async fn token_handler(
    State(state): State<AppState>,
    Json(payload): Json<TokenPayload>,
) -> impl IntoResponse {
    let req = LoginRequest { username: payload.username, password: payload.password };
    match login(&state.store, &state.sessions, &req) {
        Ok(resp) => (
            StatusCode::OK,
            Json(json!({"access_token": resp.session.token, "token_type": "bearer"})),
        ),
        Err(e) => error_response(e),
    }
}

async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let token = bearer_token(&headers);
    if state.sessions.logout(&token) {
        (StatusCode::OK, Json(json!({"status": "ok"})))
    } else {
        error_response(AppError::unauthenticated("Could not validate credentials"))
    }
}

async fn me_handler(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    // Identity-only check; no permissions required.
    match state.authorizer.authenticator().authenticate(&bearer_token(&headers)) {
        Ok(principal) => (StatusCode::OK, Json(json!({"data": principal}))),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct CreatePracticePayload {
    medical_practice: NewPractice,
    master_user: NewUser,
}

async fn create_practice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePracticePayload>,
) -> impl IntoResponse {
    if let Err(e) = state
        .authorizer
        .check(&bearer_token(&headers), &CREATE_PRACTICE_PERMISSIONS)
    {
        return error_response(e);
    }
    match state
        .registration
        .register_practice(payload.medical_practice, payload.master_user)
    {
        Ok((practice_id, user_id)) => (
            StatusCode::CREATED,
            Json(json!({"practice_id": practice_id, "user_id": user_id})),
        ),
        Err(e) => error_response(e),
    }
}

async fn list_practices(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    match state
        .authorizer
        .check(&bearer_token(&headers), &LIST_PRACTICES_PERMISSIONS)
    {
        Ok(_) => (StatusCode::OK, Json(json!({"data": state.store.list_practices()}))),
        Err(e) => error_response(e),
    }
}

async fn get_practice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(practice_id): Path<String>,
) -> impl IntoResponse {
    if let Err(e) = state.authorizer.authenticator().authenticate(&bearer_token(&headers)) {
        return error_response(e);
    }
    // A malformed id is indistinguishable from an unknown practice.
    let Ok(id) = Uuid::try_parse(&practice_id) else {
        return error_response(AppError::not_found("Practice not found"));
    };
    match state.store.get_practice(id) {
        Some(practice) => (StatusCode::OK, Json(json!({"data": practice}))),
        None => error_response(AppError::not_found("Practice not found")),
    }
}

async fn register_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    Json(member): Json<NewUser>,
) -> impl IntoResponse {
    let Some(kind) = RegistrationKind::parse(&entity) else {
        return error_response(AppError::validation(format!("Unknown entity '{}'", entity)));
    };
    // Per-entity requirement declared here, at the wiring site.
    let required = match kind {
        RegistrationKind::Gp => RequiredPermissions::new(["practice.register-gps"]),
        RegistrationKind::Patient => RequiredPermissions::new(["practice.register-patients"]),
        _ => {
            return error_response(AppError::forbidden("Unauthorized.", vec![]));
        }
    };
    let principal = match state.authorizer.check(&bearer_token(&headers), &required) {
        Ok(p) => p,
        Err(e) => return error_response(e),
    };
    let Some(practice_id) = principal.practice_id else {
        return error_response(AppError::not_found("Practice not found"));
    };
    match state.registration.register_member(practice_id, member, kind) {
        Ok(user_id) => (StatusCode::CREATED, Json(json!({"user_id": user_id}))),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct ConvertPayload {
    registration_token: String,
    password: String,
}

async fn convert_pending_user(
    State(state): State<AppState>,
    Json(payload): Json<ConvertPayload>,
) -> impl IntoResponse {
    match state
        .registration
        .convert_pending_user(&payload.registration_token, &payload.password)
    {
        Ok(user_id) => {
            // Conversion doubles as first login for the activated account.
            let session = state.sessions.issue(user_id);
            (
                StatusCode::CREATED,
                Json(json!({
                    "user_id": user_id,
                    "access_token": session.token,
                    "token_type": "bearer"
                })),
            )
        }
        Err(e) => error_response(e),
    }
}
