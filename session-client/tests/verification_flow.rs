mod support;

use std::sync::Arc;

use chrono::Duration;
use common_auth::{AuthError, UserClass, VerifyFailure};
use serde_json::json;
use session_client::clock::Clock;
use session_client::session::{ClassSession, SessionState};
use session_client::verifier::SessionVerifier;
use support::{profile, record, store_fixture, FakeBackend, StoreFixture};

fn admin_session(fixture: &StoreFixture, backend: &Arc<FakeBackend>) -> ClassSession {
    let verifier = SessionVerifier::admin(backend.clone()).with_clock(Arc::new(fixture.clock.clone()));
    ClassSession::new(fixture.store.clone(), verifier, backend.clone())
}

fn lawyer_session(fixture: &StoreFixture, backend: &Arc<FakeBackend>) -> ClassSession {
    let verifier =
        SessionVerifier::lawyer(backend.clone()).with_clock(Arc::new(fixture.clock.clone()));
    ClassSession::new(fixture.store.clone(), verifier, backend.clone())
}

#[tokio::test]
async fn valid_verification_refreshes_user_snapshot() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    fixture
        .store
        .set(UserClass::Admin, &record("admin-token"))
        .unwrap();
    backend.respond(
        "verify-admin-session",
        Ok(json!({
            "valid": true,
            "user": {"id": "u-1", "email": "new@example.com", "name": "Renamed", "role": "super_admin"}
        })),
    );

    let session = admin_session(&fixture, &backend);
    assert!(session.check().await);

    let user = session.user().expect("authenticated user");
    assert_eq!(user.name, "Renamed");
    assert_eq!(user.flag("role"), Some(&json!("super_admin")));

    let stored = fixture.store.get(UserClass::Admin).unwrap();
    assert_eq!(stored.token, "admin-token");
    assert_eq!(stored.user.email, "new@example.com");

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body, json!({"token": "admin-token"}));
    assert_eq!(calls[0].headers.get("authorization"), Some("admin-token"));
}

#[tokio::test]
async fn rejected_verification_purges_record() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    fixture.store.set(UserClass::Lawyer, &record("l")).unwrap();
    backend.respond(
        "verify-lawyer-session",
        Ok(json!({"valid": false, "error": "revoked"})),
    );

    let session = lawyer_session(&fixture, &backend);
    assert!(!session.check().await);
    assert_eq!(fixture.store.get(UserClass::Lawyer), None);
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn unreachable_backend_fails_closed() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    fixture.store.set(UserClass::Admin, &record("a")).unwrap();
    backend.respond(
        "verify-admin-session",
        Err(AuthError::Transport("connection refused".into())),
    );

    let verifier = SessionVerifier::admin(backend.clone());
    let verification = verifier.verify(&record("a")).await;
    assert!(!verification.valid);
    assert_eq!(
        verification.error,
        Some(VerifyFailure::Unreachable("connection refused".into()))
    );

    let session = admin_session(&fixture, &backend);
    assert!(!session.check().await);
    assert_eq!(fixture.store.get(UserClass::Admin), None);
}

#[tokio::test]
async fn expired_function_error_maps_to_expired() {
    let backend = FakeBackend::new();
    backend.respond(
        "verify-admin-session",
        Err(AuthError::Function {
            name: "verify-admin-session".into(),
            message: "Token expired".into(),
        }),
    );
    let verification = SessionVerifier::admin(backend.clone())
        .verify_token("stale")
        .await;
    assert_eq!(verification.error, Some(VerifyFailure::Expired));
}

#[tokio::test]
async fn locally_expired_record_skips_network() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    fixture
        .store
        .set(
            UserClass::Admin,
            &record("a").expiring_at(fixture.clock.now() - Duration::seconds(1)),
        )
        .unwrap();

    let session = admin_session(&fixture, &backend);
    assert!(!session.check().await);
    assert!(backend.calls().is_empty());
    assert_eq!(fixture.store.get(UserClass::Admin), None);
}

#[tokio::test]
async fn local_unexpired_record_still_needs_server_confirmation() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    fixture
        .store
        .set(
            UserClass::Admin,
            &record("a").expiring_at(fixture.clock.now() + Duration::hours(1)),
        )
        .unwrap();
    backend.respond("verify-admin-session", Ok(json!({"expired": true})));

    let session = admin_session(&fixture, &backend);
    assert!(!session.check().await);
    assert_eq!(backend.calls().len(), 1);
    assert_eq!(fixture.store.get(UserClass::Admin), None);
}

#[tokio::test]
async fn missing_record_short_circuits() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    let session = admin_session(&fixture, &backend);
    assert!(!session.check().await);
    assert!(backend.calls().is_empty());

    let verification = SessionVerifier::admin(backend.clone()).verify_token("  ").await;
    assert_eq!(verification.error, Some(VerifyFailure::MissingToken));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn late_result_after_logout_is_ignored() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    fixture.store.set(UserClass::Admin, &record("a")).unwrap();
    backend.respond(
        "verify-admin-session",
        Ok(json!({"valid": true, "user": {"id": "u-1"}})),
    );
    let release = backend.hold_next_invoke();
    let session = admin_session(&fixture, &backend);

    let (checked, _) = tokio::join!(session.check(), async {
        tokio::task::yield_now().await;
        assert_eq!(session.state(), SessionState::Verifying);
        session.logout();
        let _ = release.send(());
    });

    assert!(!checked);
    assert_eq!(session.state(), SessionState::Unauthenticated);
    assert_eq!(fixture.store.get(UserClass::Admin), None, "stale success must not rewrite");
}

#[tokio::test]
async fn late_failure_after_detach_keeps_record() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    fixture.store.set(UserClass::Admin, &record("a")).unwrap();
    backend.respond("verify-admin-session", Ok(json!({"valid": false})));
    let release = backend.hold_next_invoke();
    let session = admin_session(&fixture, &backend);

    let (checked, _) = tokio::join!(session.check(), async {
        tokio::task::yield_now().await;
        session.detach();
        let _ = release.send(());
    });

    assert!(!checked);
    assert!(fixture.store.get(UserClass::Admin).is_some());
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn detached_recheck_restores_authenticated_state() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    backend.respond("verify-admin-session", Ok(json!({"valid": false})));
    let session = admin_session(&fixture, &backend);
    session.adopt(record("a")).unwrap();
    let mut states = session.subscribe();
    states.borrow_and_update();
    let release = backend.hold_next_invoke();

    let (checked, _) = tokio::join!(session.check(), async {
        tokio::task::yield_now().await;
        assert_eq!(session.state(), SessionState::Verifying);
        session.detach();
        let _ = release.send(());
    });

    assert!(checked);
    assert!(matches!(session.state(), SessionState::Authenticated(ref p) if p.id == "u-1"));
    assert!(states.has_changed().unwrap());
    assert_ne!(*states.borrow_and_update(), SessionState::Verifying);
    assert_eq!(fixture.store.get(UserClass::Admin).unwrap().token, "a");
}

#[tokio::test]
async fn login_exchanges_credentials_and_applies_default_ttl() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    backend.respond(
        "admin-login",
        Ok(json!({"token": "issued", "user": {"id": "adm-7", "email": "ops@example.com"}})),
    );

    let session = admin_session(&fixture, &backend);
    let mut states = session.subscribe();
    let user = session
        .login(json!({"email": "ops@example.com", "password": "hunter2"}))
        .await
        .unwrap();

    assert_eq!(user.id, "adm-7");
    assert!(states.has_changed().unwrap());
    assert!(matches!(&*states.borrow_and_update(), SessionState::Authenticated(p) if p.id == "adm-7"));

    let stored = fixture.store.get(UserClass::Admin).unwrap();
    assert_eq!(stored.token, "issued");
    assert_eq!(
        stored.expires_at,
        Some(fixture.clock.now() + Duration::hours(8))
    );
}

#[tokio::test]
async fn failed_login_leaves_store_untouched() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    backend.respond(
        "lawyer-token-login",
        Err(AuthError::Function {
            name: "lawyer-token-login".into(),
            message: "invalid token".into(),
        }),
    );

    let session = lawyer_session(&fixture, &backend);
    let err = session
        .login(json!({"token": "magic-link"}))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Function { .. }));
    assert_eq!(fixture.store.get(UserClass::Lawyer), None);
    assert_eq!(session.state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn logout_clears_record_and_state() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    let session = lawyer_session(&fixture, &backend);
    let mut record = record("l");
    record.user = profile("law-1");
    session.adopt(record).unwrap();
    assert!(session.is_authenticated());

    session.logout();
    assert_eq!(fixture.store.get(UserClass::Lawyer), None);
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn federated_token_replaces_fallback_record() {
    let fixture = store_fixture();
    let backend = FakeBackend::new();
    let session = lawyer_session(&fixture, &backend);

    assert!(!session.sync_federated(backend.as_ref()).await, "no federated session yet");

    fixture.store.set(UserClass::Lawyer, &record("fallback")).unwrap();
    backend.set_session("law-1", "federated-jwt");
    assert!(session.sync_federated(backend.as_ref()).await);

    let stored = fixture.store.get(UserClass::Lawyer).unwrap();
    assert_eq!(stored.token, "federated-jwt");
    assert_eq!(stored.user.id, "u-1");
}
