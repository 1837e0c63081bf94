//! Central identity and session management for the service.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod session;
mod provider;
mod authorizer;

pub use principal::Principal;
pub use session::{Session, SessionToken, SessionManager};
pub use provider::{login, LoginRequest, LoginResponse};
pub use authorizer::{
    missing_permissions, PermissionAuthorizer, RequiredPermissions, SessionAuthenticator,
    WILDCARD_PERMISSION,
};
