//! Unified application error model and mapping helpers.
//! One enum covers the whole registration/authorization surface so every
//! component classifies failures at the point of detection and the HTTP
//! boundary translates them without reinterpretation. Unauthenticated and
//! Forbidden are distinct on purpose: they carry different remediation
//! meaning and must never collapse into each other.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Malformed or missing input fields; caller can fix and retry.
    Validation { message: String },
    /// Username already taken by a pending or active user.
    Duplicate { message: String },
    /// The credential store failed to commit; transient.
    Persistence { message: String },
    /// Registration token absent, malformed, consumed or expired.
    InvalidToken { message: String },
    /// Token resolved but its user is no longer pending.
    InvalidState { message: String },
    /// No valid active identity behind the presented credential.
    Unauthenticated { message: String },
    /// Valid identity, insufficient permissions.
    Forbidden {
        message: String,
        #[serde(default)]
        missing: Vec<String>,
    },
    /// Referenced entity does not exist.
    NotFound { message: String },
    Internal { message: String },
}

impl AppError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::Duplicate { .. } => "duplicate_identity",
            AppError::Persistence { .. } => "persistence_error",
            AppError::InvalidToken { .. } => "invalid_token",
            AppError::InvalidState { .. } => "invalid_state",
            AppError::Unauthenticated { .. } => "unauthenticated",
            AppError::Forbidden { .. } => "forbidden",
            AppError::NotFound { .. } => "not_found",
            AppError::Internal { .. } => "internal_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Validation { message }
            | AppError::Duplicate { message }
            | AppError::Persistence { message }
            | AppError::InvalidToken { message }
            | AppError::InvalidState { message }
            | AppError::Unauthenticated { message }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message }
            | AppError::Internal { message } => message.as_str(),
        }
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self { AppError::Validation { message: msg.into() } }
    pub fn duplicate<S: Into<String>>(msg: S) -> Self { AppError::Duplicate { message: msg.into() } }
    pub fn persistence<S: Into<String>>(msg: S) -> Self { AppError::Persistence { message: msg.into() } }
    pub fn invalid_token<S: Into<String>>(msg: S) -> Self { AppError::InvalidToken { message: msg.into() } }
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self { AppError::InvalidState { message: msg.into() } }
    pub fn unauthenticated<S: Into<String>>(msg: S) -> Self { AppError::Unauthenticated { message: msg.into() } }
    pub fn forbidden<S: Into<String>>(msg: S, missing: Vec<String>) -> Self {
        AppError::Forbidden { message: msg.into(), missing }
    }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AppError::NotFound { message: msg.into() } }
    pub fn internal<S: Into<String>>(msg: S) -> Self { AppError::Internal { message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::Duplicate { .. } => 400,
            AppError::Persistence { .. } => 503,
            AppError::InvalidToken { .. } => 401,
            AppError::InvalidState { .. } => 400,
            AppError::Unauthenticated { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless classified at the source
        AppError::Internal { message: err.to_string() }
    }
}
