//! Token issuance for registration links and bearer sessions.
//! Registration tokens are v4 UUIDs: 122 bits from the OS CSPRNG, hyphenated
//! ASCII, safe in a URL query string without escaping. Session tokens are
//! 256-bit base64url strings backed by the in-memory session table.

use base64::Engine;
use uuid::Uuid;

/// One-time registration token embedded in the signup link.
pub fn new_registration_token() -> String {
    Uuid::new_v4().to_string()
}

/// Opaque bearer credential for an authenticated session.
pub fn new_session_token() -> String {
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Strict round-trip check that a presented registration token is a UUID.
/// Malformed strings are rejected before any store lookup.
pub fn is_valid_token_format(token: &str) -> bool {
    match Uuid::try_parse(token) {
        Ok(parsed) => parsed.to_string() == token.to_lowercase(),
        Err(_) => false,
    }
}
