use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resolved identity handed to downstream checks after authentication.
/// Permissions are re-read from the credential store on every request, never
/// cached across calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub permissions: HashSet<String>,
    /// Institution the caller belongs to, when any.
    #[serde(default)]
    pub practice_id: Option<Uuid>,
}

impl Principal {
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }
}
