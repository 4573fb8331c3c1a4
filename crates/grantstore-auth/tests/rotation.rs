//! Rotation, transactions, deadlines and index reconciliation.

mod common;

use std::time::Duration;

use grantstore_auth::{ArtifactKind, AuthError, ManagerConfig};
use grantstore_db_memory::StoreOp;
use grantstore_storage::{Collection, DocumentOps};

use common::{Harness, harness};

async fn issue_tokens(h: &Harness, request_id: &str, access: &str, refresh: &str) {
    let requester = h.requester(request_id);
    h.manager
        .create_access_token_session(access, &requester)
        .await
        .unwrap();
    h.manager
        .create_refresh_token_session(refresh, &requester)
        .await
        .unwrap();
}

// =============================================================================
// Rotation
// =============================================================================

#[tokio::test]
async fn test_refresh_grant_rotates_tokens() {
    let h = harness(ManagerConfig::default()).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    h.manager
        .persist_refresh_token_grant_session("sigR1", "sigA2", "sigR2", &h.requester("req1"))
        .await
        .unwrap();

    assert!(h.manager.get_access_token_session("sigA1").await.unwrap_err().is_not_found());
    assert!(h.manager.get_refresh_token_session("sigR1").await.unwrap_err().is_not_found());
    assert!(h.manager.get_access_token_session("sigA2").await.is_ok());
    assert!(h.manager.get_refresh_token_session("sigR2").await.is_ok());

    // The index follows the new tokens.
    h.manager.revoke_access_token("req1").await.unwrap();
    assert!(h.manager.get_access_token_session("sigA2").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_authorize_code_grant_issues_tokens() {
    let h = harness(ManagerConfig::default()).await;
    let requester = h.requester("req-code");
    h.manager
        .create_authorize_code_session("code-sig", &requester)
        .await
        .unwrap();

    h.manager
        .persist_authorize_code_grant_session("code-sig", "sigA1", Some("sigR1"), &requester)
        .await
        .unwrap();

    assert_eq!(h.manager.get_access_token_session("sigA1").await.unwrap(), requester);
    assert_eq!(h.manager.get_refresh_token_session("sigR1").await.unwrap(), requester);
}

#[tokio::test]
async fn test_authorize_code_grant_without_refresh_token() {
    let h = harness(ManagerConfig::default()).await;
    let requester = h.requester("req-code");
    h.manager
        .create_authorize_code_session("code-sig", &requester)
        .await
        .unwrap();

    h.manager
        .persist_authorize_code_grant_session("code-sig", "sigA1", None, &requester)
        .await
        .unwrap();

    assert!(h.manager.get_access_token_session("sigA1").await.is_ok());
    assert_eq!(h.store.count(Collection::RefreshTokens).await, 0);
}

#[tokio::test]
async fn test_rotation_of_unknown_token_is_not_found() {
    let h = harness(ManagerConfig::default()).await;
    let err = h
        .manager
        .persist_refresh_token_grant_session("missing", "sigA2", "sigR2", &h.requester("req1"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(h.store.count(Collection::AccessTokens).await, 0);
}

#[tokio::test]
async fn test_failed_transactional_rotation_rolls_back() {
    let h = harness(ManagerConfig::default()).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    // Steps 2 and 3 succeed, step 4 fails.
    h.store
        .faults()
        .fail_next(Some(Collection::AccessTokens), StoreOp::Create);

    let err = h
        .manager
        .persist_refresh_token_grant_session("sigR1", "sigA2", "sigR2", &h.requester("req1"))
        .await
        .unwrap_err();
    assert!(err.is_server_error());

    assert!(h.manager.get_access_token_session("sigA1").await.is_ok());
    assert!(h.manager.get_refresh_token_session("sigR1").await.is_ok());
    assert!(h.manager.get_access_token_session("sigA2").await.unwrap_err().is_not_found());
    assert!(h.manager.get_refresh_token_session("sigR2").await.unwrap_err().is_not_found());

    // The old tokens are still revocable by request id.
    h.manager.revoke_access_token("req1").await.unwrap();
    h.manager.revoke_refresh_token("req1").await.unwrap();
}

#[tokio::test]
async fn test_non_transactional_rotation_can_lose_tokens() {
    let config = ManagerConfig {
        transactional_rotation: false,
        ..Default::default()
    };
    let h = harness(config).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    h.store
        .faults()
        .fail_next(Some(Collection::AccessTokens), StoreOp::Create);
    assert!(
        h.manager
            .persist_refresh_token_grant_session("sigR1", "sigA2", "sigR2", &h.requester("req1"))
            .await
            .is_err()
    );

    assert_eq!(h.store.count(Collection::AccessTokens).await, 0);
    assert_eq!(h.store.count(Collection::RefreshTokens).await, 0);
}

#[tokio::test]
async fn test_commit_failure_leaves_old_tokens() {
    let h = harness(ManagerConfig::default()).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    h.store.faults().fail_next(None, StoreOp::Commit);
    let err = h
        .manager
        .persist_refresh_token_grant_session("sigR1", "sigA2", "sigR2", &h.requester("req1"))
        .await
        .unwrap_err();
    assert!(err.is_server_error());
    assert!(h.manager.get_refresh_token_session("sigR1").await.is_ok());
    assert!(h.manager.get_refresh_token_session("sigR2").await.is_err());
}

// =============================================================================
// Explicit transactions
// =============================================================================

#[tokio::test]
async fn test_request_transaction_commit() {
    let h = harness(ManagerConfig::default()).await;
    let requester = h.requester("req-code");
    h.manager
        .create_authorize_code_session("code-sig", &requester)
        .await
        .unwrap();

    let tx = h.manager.begin().await.unwrap();
    tx.invalidate_authorize_code_session("code-sig").await.unwrap();
    tx.create_session(ArtifactKind::AccessToken, "sigA1", &requester)
        .await
        .unwrap();
    assert!(tx.get_session(ArtifactKind::AccessToken, "sigA1").await.is_ok());

    // Not visible outside the transaction yet.
    assert!(h.manager.get_access_token_session("sigA1").await.unwrap_err().is_not_found());
    assert!(h.manager.get_authorize_code_session("code-sig").await.is_ok());

    tx.commit().await.unwrap();

    assert!(h.manager.get_access_token_session("sigA1").await.is_ok());
    assert!(
        h.manager
            .get_authorize_code_session("code-sig")
            .await
            .unwrap_err()
            .is_invalidated_authorize_code()
    );
}

#[tokio::test]
async fn test_request_transaction_rollback() {
    let h = harness(ManagerConfig::default()).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    let tx = h.manager.begin().await.unwrap();
    tx.persist_refresh_token_grant_session("sigR1", "sigA2", "sigR2", &h.requester("req1"))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(h.manager.get_access_token_session("sigA1").await.is_ok());
    assert!(h.manager.get_access_token_session("sigA2").await.is_err());
}

#[tokio::test]
async fn test_conflicting_transactions_one_loses() {
    let h = harness(ManagerConfig::default()).await;
    let first = h.manager.begin().await.unwrap();
    let second = h.manager.begin().await.unwrap();

    first
        .create_session(ArtifactKind::AccessToken, "sigA1", &h.requester("req1"))
        .await
        .unwrap();
    second
        .create_session(ArtifactKind::AccessToken, "sigA1", &h.requester("req2"))
        .await
        .unwrap();

    first.commit().await.unwrap();
    let err = second.commit().await.unwrap_err();
    assert!(err.is_serialization_failure());
    assert_eq!(h.store.count(Collection::AccessTokens).await, 1);
}

#[tokio::test]
async fn test_transactional_session_writes_are_atomic() {
    let config = ManagerConfig {
        transactional_session_writes: true,
        ..Default::default()
    };
    let h = harness(config).await;

    h.store
        .faults()
        .fail_next(Some(Collection::CacheAccessTokens), StoreOp::Create);
    assert!(
        h.manager
            .create_access_token_session("sigA1", &h.requester("req1"))
            .await
            .is_err()
    );
    assert_eq!(h.store.count(Collection::AccessTokens).await, 0);

    h.manager
        .create_access_token_session("sigA1", &h.requester("req1"))
        .await
        .unwrap();
    assert_eq!(h.store.count(Collection::CacheAccessTokens).await, 1);
}

// =============================================================================
// Deadlines
// =============================================================================

#[tokio::test]
async fn test_slow_store_exceeds_deadline() {
    let config = ManagerConfig {
        operation_timeout: Some(Duration::from_millis(20)),
        ..Default::default()
    };
    let h = harness(config).await;
    h.manager
        .create_access_token_session("sigA1", &h.requester("req1"))
        .await
        .unwrap();

    h.store.faults().set_latency(Some(Duration::from_millis(200)));
    let err = h.manager.get_access_token_session("sigA1").await.unwrap_err();
    assert!(matches!(err, AuthError::DeadlineExceeded));
    assert_eq!(err.oauth_error_code(), "temporarily_unavailable");

    h.store.faults().set_latency(None);
    assert!(h.manager.get_access_token_session("sigA1").await.is_ok());
}

#[tokio::test]
async fn test_cancelled_rotation_applies_nothing() {
    let config = ManagerConfig {
        operation_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let h = harness(config).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    h.store.faults().set_latency(Some(Duration::from_millis(20)));
    let err = h
        .manager
        .persist_refresh_token_grant_session("sigR1", "sigA2", "sigR2", &h.requester("req1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::DeadlineExceeded));

    h.store.faults().set_latency(None);
    assert!(h.manager.get_access_token_session("sigA1").await.is_ok());
    assert!(h.manager.get_refresh_token_session("sigR1").await.is_ok());
    assert!(h.manager.get_refresh_token_session("sigR2").await.is_err());
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Every finding is old enough to repair.
fn settled() -> ManagerConfig {
    ManagerConfig {
        reconcile_grace_period: Duration::ZERO,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_reconcile_consistent_store() {
    let h = harness(ManagerConfig::default()).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    let report = h.manager.reconcile(false).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.repaired, 0);
}

#[tokio::test]
async fn test_reconcile_repairs_orphaned_entry() {
    let h = harness(settled()).await;
    issue_tokens(&h, "req1", "sigA1", "sigR1").await;

    // Token removed behind the manager's back.
    h.store
        .delete_by_signature(Collection::AccessTokens, "sigA1")
        .await
        .unwrap();

    let report = h.manager.reconcile(false).await.unwrap();
    assert!(!report.is_consistent());
    assert_eq!(report.orphaned_entries.len(), 1);
    assert_eq!(report.orphaned_entries[0].kind, ArtifactKind::AccessToken);
    assert_eq!(report.orphaned_entries[0].request_id, "req1");
    assert_eq!(h.store.count(Collection::CacheAccessTokens).await, 1);

    let report = h.manager.reconcile(true).await.unwrap();
    assert_eq!(report.repaired, 1);
    assert_eq!(h.store.count(Collection::CacheAccessTokens).await, 0);
    assert!(h.manager.reconcile(false).await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_reconcile_tracks_untracked_request() {
    let h = harness(settled()).await;

    h.manager
        .create_refresh_token_session("sigR1", &h.requester("req1"))
        .await
        .unwrap();
    // The index entry is lost, as after a failed index write.
    h.store
        .delete(Collection::CacheRefreshTokens, "req1")
        .await
        .unwrap();
    assert!(h.manager.revoke_refresh_token("req1").await.unwrap_err().is_not_found());

    let report = h.manager.reconcile(true).await.unwrap();
    assert_eq!(report.untracked_requests.len(), 1);
    assert_eq!(report.untracked_requests[0].signature, "sigR1");
    assert_eq!(report.repaired, 1);

    h.manager.revoke_refresh_token("req1").await.unwrap();
    assert_eq!(h.store.count(Collection::RefreshTokens).await, 0);
}
