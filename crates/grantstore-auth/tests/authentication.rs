//! User authentication and client assertion replay protection.

mod common;

use grantstore_auth::{ManagerConfig, User, UserDirectory};
use grantstore_storage::Collection;
use time::{Duration, OffsetDateTime};

use common::harness;

#[tokio::test]
async fn test_authenticate_outcomes() {
    let h = harness(ManagerConfig::default()).await;
    h.manager
        .users()
        .create_user(User {
            password: Some("wonderland".into()),
            ..User::new("u1", "alice")
        })
        .await
        .unwrap();

    let user = h.manager.authenticate("alice", "wonderland").await.unwrap();
    assert_eq!(user.id, "u1");

    let err = h.manager.authenticate("alice", "looking-glass").await.unwrap_err();
    assert!(err.is_access_denied());
    assert_eq!(err.oauth_error_code(), "access_denied");

    let err = h.manager.authenticate("nobody", "x").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_disabled_user_cannot_authenticate() {
    let h = harness(ManagerConfig::default()).await;
    let users = h.manager.users();
    users
        .create_user(User {
            password: Some("pw".into()),
            disabled: true,
            ..User::new("u1", "alice")
        })
        .await
        .unwrap();

    let err = h.manager.authenticate("alice", "pw").await.unwrap_err();
    assert!(err.is_access_denied());
}

#[tokio::test]
async fn test_store_failure_propagates_from_authenticate() {
    use grantstore_db_memory::StoreOp;

    let h = harness(ManagerConfig::default()).await;
    h.store
        .faults()
        .fail_next(Some(Collection::Users), StoreOp::List);

    let err = h.manager.authenticate("alice", "pw").await.unwrap_err();
    assert!(err.is_server_error());
}

#[tokio::test]
async fn test_client_assertion_jti_is_single_use() {
    let h = harness(ManagerConfig::default()).await;
    let expiry = OffsetDateTime::now_utc() + Duration::hours(1);

    h.manager.client_assertion_jwt_valid("jti-1").await.unwrap();
    h.manager
        .set_client_assertion_jwt("jti-1", expiry)
        .await
        .unwrap();

    let err = h.manager.client_assertion_jwt_valid("jti-1").await.unwrap_err();
    assert!(err.is_conflict());
    let err = h
        .manager
        .set_client_assertion_jwt("jti-1", expiry)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    h.manager.client_assertion_jwt_valid("jti-2").await.unwrap();
}

#[tokio::test]
async fn test_expired_jtis_are_pruned() {
    let h = harness(ManagerConfig::default()).await;
    let now = OffsetDateTime::now_utc();

    h.manager
        .set_client_assertion_jwt("fresh", now + Duration::hours(1))
        .await
        .unwrap();
    h.manager
        .set_client_assertion_jwt("stale", now - Duration::minutes(5))
        .await
        .unwrap();

    // An expired entry no longer blocks reuse.
    h.manager.client_assertion_jwt_valid("stale").await.unwrap();
    assert_eq!(h.store.count(Collection::JtiDenylist).await, 2);

    let removed = h.manager.delete_denied_jtis_before(now).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(h.store.count(Collection::JtiDenylist).await, 1);

    // Recording a new JTI prunes anything expired first.
    h.manager
        .set_client_assertion_jwt("stale-again", now - Duration::minutes(1))
        .await
        .unwrap();
    h.manager
        .set_client_assertion_jwt("another", now + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(h.store.count(Collection::JtiDenylist).await, 2);
}

#[tokio::test]
async fn test_jti_is_stored_hashed() {
    use grantstore_storage::{DocumentFilter, DocumentOps};

    let h = harness(ManagerConfig::default()).await;
    h.manager
        .set_client_assertion_jwt("raw-jti-value", OffsetDateTime::now_utc() + Duration::hours(1))
        .await
        .unwrap();

    let stored = h
        .store
        .list(Collection::JtiDenylist, &DocumentFilter::new())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    let signature = stored[0]["signature"].as_str().unwrap();
    assert_eq!(signature.len(), 64);
    assert!(!signature.contains("raw-jti-value"));
}
