//! Environment-backed configuration for the service.
//! Every value has a default so a bare `praxis` binary starts; overrides come
//! from `PRAXIS_*` environment variables. Secret values are masked in logs.

use tracing::info;

/// Read an override from the environment, logging when one takes effect.
fn override_value(key: &str, default: &str, secret: bool) -> String {
    match std::env::var(key) {
        Ok(value) => {
            let shown = if secret { "*".repeat(value.len()) } else { value.clone() };
            info!(target: "praxis::config", "overriding {} with value {}", key, shown);
            value
        }
        Err(_) => default.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds on.
    pub http_port: u16,
    /// Base URL of the front-end used to build signup links.
    pub front_end_base_url: String,
    /// From-address handed to the mailer.
    pub mail_from_address: String,
    /// Hours a registration token stays convertible. Default 48.
    pub registration_token_ttl_hours: i64,
    /// Minutes a session token stays valid. Default 180.
    pub session_ttl_minutes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 7878,
            front_end_base_url: "http://localhost:3000".to_string(),
            mail_from_address: "no-reply@prescriptionmanagementsystem.com".to_string(),
            registration_token_ttl_hours: 48,
            session_ttl_minutes: 180,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let http_port = override_value("PRAXIS_HTTP_PORT", &defaults.http_port.to_string(), false)
            .parse()
            .unwrap_or(defaults.http_port);
        let front_end_base_url =
            override_value("PRAXIS_FRONT_END_BASE_URL", &defaults.front_end_base_url, false);
        let mail_from_address =
            override_value("PRAXIS_MAIL_FROM_ADDRESS", &defaults.mail_from_address, false);
        let registration_token_ttl_hours = override_value(
            "PRAXIS_REGISTRATION_TOKEN_TTL_HOURS",
            &defaults.registration_token_ttl_hours.to_string(),
            false,
        )
        .parse()
        .unwrap_or(defaults.registration_token_ttl_hours);
        let session_ttl_minutes = override_value(
            "PRAXIS_SESSION_TTL_MINUTES",
            &defaults.session_ttl_minutes.to_string(),
            false,
        )
        .parse()
        .unwrap_or(defaults.session_ttl_minutes);
        Self {
            http_port,
            front_end_base_url,
            mail_from_address,
            registration_token_ttl_hours,
            session_ttl_minutes,
        }
    }
}
