//! Conversion integration tests: the one-time pending -> active protocol.
//! Covers the round trip, unknown/malformed/expired tokens, double conversion
//! and the concurrent race where exactly one caller may win.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;

use praxis::mail::RecordingMailer;
use praxis::registration::{NewPractice, NewUser, RegistrationManager};
use praxis::store::{CredentialStore, UserStatus};

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

fn manager_with_ttl(store: &CredentialStore, ttl_hours: i64) -> RegistrationManager {
    RegistrationManager::new(
        store.clone(),
        Arc::new(RecordingMailer::new()),
        "https://app.praxis.example".into(),
        ttl_hours,
    )
}

#[tokio::test]
async fn convert_round_trip_then_second_call_fails() -> Result<()> {
    let store = CredentialStore::new();
    let manager = manager_with_ttl(&store, 48);
    let (_, user_id) = manager.register_practice(practice("Acme Clinic"), user("alice"))?;
    let token = store.token_for_user(user_id).unwrap().token_id;

    let converted = manager.convert_pending_user(&token, "P@ss1234")?;
    assert_eq!(converted, user_id);

    let alice = store.get_user(user_id).unwrap();
    assert_eq!(alice.status, UserStatus::Active);
    let hash = alice.password_hash.as_deref().expect("hash set at conversion");
    assert_ne!(hash, "P@ss1234", "password must be stored hashed");
    assert!(praxis::security::verify_password(hash, "P@ss1234"));
    assert!(
        alice.permissions.contains("practices.all"),
        "conversion grants the kind's default permissions"
    );

    let err = manager
        .convert_pending_user(&token, "another-pass")
        .expect_err("a consumed token must never convert again");
    assert_eq!(err.code_str(), "invalid_token");
    Ok(())
}

#[tokio::test]
async fn unknown_token_always_fails_invalid_token() -> Result<()> {
    let store = CredentialStore::new();
    let manager = manager_with_ttl(&store, 48);
    manager.register_practice(practice("Acme Clinic"), user("alice"))?;

    // Well-formed but unknown.
    let err = manager
        .convert_pending_user(&uuid::Uuid::new_v4().to_string(), "P@ss1234")
        .expect_err("unknown token");
    assert_eq!(err.code_str(), "invalid_token");

    // Malformed: rejected before any store lookup.
    let err = manager
        .convert_pending_user("not-a-uuid", "P@ss1234")
        .expect_err("malformed token");
    assert_eq!(err.code_str(), "invalid_token");
    Ok(())
}

#[tokio::test]
async fn empty_password_is_a_validation_error() -> Result<()> {
    let store = CredentialStore::new();
    let manager = manager_with_ttl(&store, 48);
    let (_, user_id) = manager.register_practice(practice("Acme Clinic"), user("alice"))?;
    let token = store.token_for_user(user_id).unwrap().token_id;

    let err = manager
        .convert_pending_user(&token, "   ")
        .expect_err("blank password");
    assert_eq!(err.code_str(), "validation_error");

    // The token survives a validation failure.
    assert!(!store.get_token(&token).unwrap().consumed);
    Ok(())
}

#[tokio::test]
async fn expired_token_fails_even_if_unconsumed() -> Result<()> {
    let store = CredentialStore::new();
    let manager = manager_with_ttl(&store, 0);
    let (_, user_id) = manager.register_practice(practice("Acme Clinic"), user("alice"))?;
    let token = store.token_for_user(user_id).unwrap().token_id;

    let err = manager
        .convert_pending_user(&token, "P@ss1234")
        .expect_err("expired token");
    assert_eq!(err.code_str(), "invalid_token");

    let alice = store.get_user(user_id).unwrap();
    assert_eq!(alice.status, UserStatus::Pending, "expiry must not mutate the user");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_conversions_have_exactly_one_winner() -> Result<()> {
    let store = CredentialStore::new();
    let manager = manager_with_ttl(&store, 48);
    let (_, user_id) = manager.register_practice(practice("Acme Clinic"), user("alice"))?;
    let token = store.token_for_user(user_id).unwrap().token_id;

    const N: usize = 8;
    let tasks: Vec<_> = (0..N)
        .map(|i| {
            let manager = manager.clone();
            let token = token.clone();
            tokio::spawn(async move {
                manager.convert_pending_user(&token, &format!("password-{}", i))
            })
        })
        .collect();
    let outcomes = join_all(tasks).await;

    let mut wins = 0usize;
    let mut losses = 0usize;
    for outcome in outcomes {
        match outcome.expect("task must not panic") {
            Ok(id) => {
                assert_eq!(id, user_id);
                wins += 1;
            }
            Err(e) => {
                assert_eq!(e.code_str(), "invalid_token", "losers must see a consumed token");
                losses += 1;
            }
        }
    }
    assert_eq!(wins, 1, "exactly one conversion may succeed");
    assert_eq!(losses, N - 1);
    assert_eq!(store.get_user(user_id).unwrap().status, UserStatus::Active);
    Ok(())
}
