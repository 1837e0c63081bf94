//! Authorization integration tests: session authentication, the two-tier
//! permission check, and the full registration -> conversion -> login flow.

use std::sync::Arc;

use anyhow::Result;

use praxis::identity::{
    login, LoginRequest, PermissionAuthorizer, RequiredPermissions, SessionAuthenticator,
    SessionManager,
};
use praxis::mail::RecordingMailer;
use praxis::registration::{NewPractice, NewUser, RegistrationManager};
use praxis::store::CredentialStore;

struct Harness {
    store: CredentialStore,
    sessions: SessionManager,
    manager: RegistrationManager,
    authorizer: PermissionAuthorizer,
}

fn harness() -> Harness {
    let store = CredentialStore::new();
    let sessions = SessionManager::default();
    let manager = RegistrationManager::new(
        store.clone(),
        Arc::new(RecordingMailer::new()),
        "https://app.praxis.example".into(),
        48,
    );
    let authorizer =
        PermissionAuthorizer::new(SessionAuthenticator::new(store.clone(), sessions.clone()));
    Harness { store, sessions, manager, authorizer }
}

fn practice(name: &str) -> NewPractice {
    NewPractice {
        name: name.into(),
        address_line_1: "1 High Street".into(),
        address_line_2: "Floor 2".into(),
        address_line_3: None,
        address_line_4: None,
        city: "Springfield".into(),
        state: "SP".into(),
        postcode: "SP1 1AA".into(),
    }
}

fn user(username: &str) -> NewUser {
    NewUser {
        username: username.into(),
        name: "Alice Adams".into(),
        email: format!("{}@acme.example", username),
    }
}

/// Register a practice and convert its master user, returning the user id.
fn activated_user(h: &Harness, username: &str, password: &str) -> uuid::Uuid {
    let (_, user_id) = h
        .manager
        .register_practice(practice(&format!("{} practice", username)), user(username))
        .expect("registration");
    let token = h.store.token_for_user(user_id).unwrap().token_id;
    h.manager
        .convert_pending_user(&token, password)
        .expect("conversion")
}

#[tokio::test]
async fn unknown_or_empty_tokens_are_unauthenticated() -> Result<()> {
    let h = harness();
    let auth = h.authorizer.authenticator();
    assert_eq!(auth.authenticate("").expect_err("empty").code_str(), "unauthenticated");
    assert_eq!(
        auth.authenticate("bogus-token").expect_err("unknown").code_str(),
        "unauthenticated"
    );
    Ok(())
}

#[tokio::test]
async fn pending_user_never_authenticates() -> Result<()> {
    let h = harness();
    let (_, user_id) = h.manager.register_practice(practice("Acme Clinic"), user("alice"))?;

    // Even a token issued directly for a pending user must be rejected: the
    // authenticator re-reads status from the store on every call.
    let session = h.sessions.issue(user_id);
    let err = h
        .authorizer
        .authenticator()
        .authenticate(&session.token)
        .expect_err("pending user must not authenticate");
    assert_eq!(err.code_str(), "unauthenticated");
    Ok(())
}

#[tokio::test]
async fn expired_session_is_treated_like_an_invalid_one() -> Result<()> {
    let h = harness();
    let user_id = activated_user(&h, "alice", "hunter2pass");

    let sessions = SessionManager::with_ttl(std::time::Duration::from_millis(0));
    let authorizer = PermissionAuthorizer::new(SessionAuthenticator::new(
        h.store.clone(),
        sessions.clone(),
    ));
    let session = sessions.issue(user_id);
    let err = authorizer
        .authenticator()
        .authenticate(&session.token)
        .expect_err("expired session");
    assert_eq!(err.code_str(), "unauthenticated");
    Ok(())
}

#[tokio::test]
async fn permission_check_is_a_set_difference() -> Result<()> {
    let h = harness();
    let user_id = activated_user(&h, "alice", "hunter2pass");
    let session = h.sessions.issue(user_id);

    // Missing permission: Forbidden, naming what is missing.
    let err = h
        .authorizer
        .check(&session.token, &RequiredPermissions::new(["test.permission"]))
        .expect_err("missing permission");
    assert_eq!(err.code_str(), "forbidden");
    match err {
        praxis::error::AppError::Forbidden { missing, .. } => {
            assert_eq!(missing, vec!["test.permission".to_string()]);
        }
        other => panic!("expected Forbidden, got {}", other),
    }

    // Held permission: identity returned, same contract as authenticate.
    h.store.grant_permission(user_id, "test.permission")?;
    let principal = h
        .authorizer
        .check(&session.token, &RequiredPermissions::new(["test.permission"]))?;
    assert_eq!(principal.user_id, user_id);
    assert_eq!(principal.username, "alice");
    Ok(())
}

#[tokio::test]
async fn all_required_permissions_must_be_held() -> Result<()> {
    let h = harness();
    let user_id = activated_user(&h, "alice", "hunter2pass");
    h.store.grant_permission(user_id, "a")?;
    let session = h.sessions.issue(user_id);

    let err = h
        .authorizer
        .check(&session.token, &RequiredPermissions::new(["a", "b"]))
        .expect_err("one of two held is not enough");
    match err {
        praxis::error::AppError::Forbidden { missing, .. } => {
            assert_eq!(missing, vec!["b".to_string()]);
        }
        other => panic!("expected Forbidden, got {}", other),
    }
    Ok(())
}

#[tokio::test]
async fn wildcard_permission_bypasses_the_check() -> Result<()> {
    let h = harness();
    let user_id = activated_user(&h, "alice", "hunter2pass");
    h.store.grant_permission(user_id, "*")?;
    let session = h.sessions.issue(user_id);

    let principal = h
        .authorizer
        .check(&session.token, &RequiredPermissions::new(["anything.at-all"]))?;
    assert_eq!(principal.user_id, user_id);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_propagates_unchanged_through_the_permission_check() -> Result<()> {
    let h = harness();
    let err = h
        .authorizer
        .check("bogus", &RequiredPermissions::new(["test.permission"]))
        .expect_err("no identity");
    // Never downgraded to Forbidden: the caller must re-authenticate, not
    // request more privileges.
    assert_eq!(err.code_str(), "unauthenticated");
    Ok(())
}

#[tokio::test]
async fn login_verifies_the_password_against_the_stored_hash() -> Result<()> {
    let h = harness();
    activated_user(&h, "alice", "hunter2pass");

    let bad = login(
        &h.store,
        &h.sessions,
        &LoginRequest { username: "alice".into(), password: "wrong".into() },
    );
    assert_eq!(bad.expect_err("wrong password").code_str(), "unauthenticated");

    let unknown = login(
        &h.store,
        &h.sessions,
        &LoginRequest { username: "nobody".into(), password: "hunter2pass".into() },
    );
    assert_eq!(unknown.expect_err("unknown user").code_str(), "unauthenticated");

    let ok = login(
        &h.store,
        &h.sessions,
        &LoginRequest { username: "alice".into(), password: "hunter2pass".into() },
    )?;
    let principal = h.authorizer.authenticator().authenticate(&ok.session.token)?;
    assert_eq!(principal.username, "alice");
    Ok(())
}

#[tokio::test]
async fn registration_to_authenticated_session_end_to_end() -> Result<()> {
    let h = harness();

    // Register practice "Acme Clinic" with master user "alice".
    let (practice_id, user_id) =
        h.manager.register_practice(practice("Acme Clinic"), user("alice"))?;
    assert!(h.store.get_practice(practice_id).is_some());

    // Convert with the issued token.
    let token = h.store.token_for_user(user_id).unwrap().token_id;
    let converted = h.manager.convert_pending_user(&token, "hunter2pass")?;
    assert_eq!(converted, user_id);
    let alice = h.store.get_user(user_id).unwrap();
    let hash = alice.password_hash.as_deref().unwrap();
    assert_ne!(hash, "hunter2pass");

    // A fresh session for the activated user authenticates and carries the
    // administrator permissions granted at conversion.
    let session = h.sessions.issue(user_id);
    let principal = h.authorizer.authenticator().authenticate(&session.token)?;
    assert_eq!(principal.user_id, user_id);
    assert!(principal.permissions.contains("practices.all"));
    assert_eq!(principal.practice_id, Some(practice_id));
    Ok(())
}
