//! Consistency sweep between tokens and their request-id index.
//!
//! Session writes are not atomic across the two collections, so a crash or
//! partial failure can leave an index entry whose token is gone (orphaned)
//! or a token nobody can revoke by request id (untracked).
//!
//! The sweep scans without locks while sessions keep being written and
//! revoked. Findings younger than the grace period are deferred, and every
//! repair re-reads both sides first. With a transactional backend each
//! repair runs in its own transaction.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use grantstore_storage::{DocumentFilter, DocumentOps, EntityStore, now_epoch};
use tracing::{debug, info, warn};

use crate::AuthResult;
use crate::cache::{SessionCache, StoreSessionCache};
use crate::manager::finish;
use crate::types::{ArtifactKind, Request, SessionCacheEntry, from_document};

/// One inconsistency found by [`RequestManager::reconcile`](super::RequestManager::reconcile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFinding {
    pub kind: ArtifactKind,
    pub request_id: String,
    pub signature: String,
}

/// Result of a reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Index entries whose signature has no backing token.
    pub orphaned_entries: Vec<CacheFinding>,
    /// Tokens with no index entry for their request id.
    pub untracked_requests: Vec<CacheFinding>,
    /// Findings inside the grace period or lost to a write conflict, left
    /// for the next sweep.
    pub deferred: Vec<CacheFinding>,
    /// Findings fixed by this sweep.
    pub repaired: usize,
}

impl ReconciliationReport {
    /// Returns `true` if the sweep found nothing to fix.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.orphaned_entries.is_empty() && self.untracked_requests.is_empty()
    }
}

/// A single fix, re-validated against the store before it is applied.
enum Repair<'a> {
    DropOrphan(ArtifactKind, &'a SessionCacheEntry),
    Track(ArtifactKind, &'a Request),
}

impl Repair<'_> {
    /// Applies the fix. Returns `false` if the finding no longer holds.
    async fn run(&self, ops: &dyn DocumentOps) -> AuthResult<bool> {
        match *self {
            Self::DropOrphan(kind, entry) => drop_orphan(ops, kind, entry).await,
            Self::Track(kind, request) => track(ops, kind, request).await,
        }
    }
}

/// The token stored under `signature`, if any.
async fn token(
    ops: &dyn DocumentOps,
    kind: ArtifactKind,
    signature: &str,
) -> AuthResult<Option<Request>> {
    match ops.get_by_signature(kind.collection(), signature).await {
        Ok(document) => Ok(Some(from_document(document)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn drop_orphan(
    ops: &dyn DocumentOps,
    kind: ArtifactKind,
    entry: &SessionCacheEntry,
) -> AuthResult<bool> {
    if token(ops, kind, &entry.signature)
        .await?
        .is_some_and(|request| request.request_id == entry.id)
    {
        return Ok(false);
    }

    let Some(cache) = StoreSessionCache::for_kind(ops, kind) else {
        return Ok(false);
    };
    match cache.get(&entry.id).await {
        Ok(current) if current.signature == entry.signature => {}
        Ok(_) => return Ok(false),
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e),
    }
    match cache.delete(&entry.id).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

async fn track(ops: &dyn DocumentOps, kind: ArtifactKind, request: &Request) -> AuthResult<bool> {
    let Some(cache) = StoreSessionCache::for_kind(ops, kind) else {
        return Ok(false);
    };
    if token(ops, kind, &request.signature).await?.is_none() {
        return Ok(false);
    }
    match cache
        .create(&request.request_id, &request.signature)
        .await
    {
        Ok(_) => Ok(true),
        Err(e) if e.is_conflict() => Ok(false),
        Err(e) => Err(e),
    }
}

async fn apply(store: &dyn EntityStore, repair: Repair<'_>) -> AuthResult<bool> {
    if !store.supports_transactions() {
        let ops: &dyn DocumentOps = store;
        return repair.run(ops).await;
    }

    let tx = store.begin_transaction().await?;
    let ops: &dyn DocumentOps = &*tx;
    let result = repair.run(ops).await;
    finish(tx, result).await
}

pub(crate) async fn sweep(
    store: &dyn EntityStore,
    repair: bool,
    grace: Duration,
) -> AuthResult<ReconciliationReport> {
    let ops: &dyn DocumentOps = store;
    let grace = i64::try_from(grace.as_secs()).unwrap_or(i64::MAX);
    let now = now_epoch();
    let settling = |create_time: i64| now.saturating_sub(create_time) < grace;
    let mut report = ReconciliationReport::default();

    for kind in ArtifactKind::CACHED {
        let Some(index) = StoreSessionCache::for_kind(ops, kind) else {
            continue;
        };
        let requests: Vec<Request> = ops
            .list(kind.collection(), &DocumentFilter::new())
            .await?
            .into_iter()
            .map(from_document)
            .collect::<AuthResult<_>>()?;
        let entries = index.entries().await?;

        let live: HashMap<&str, &str> = requests
            .iter()
            .map(|r| (r.signature.as_str(), r.request_id.as_str()))
            .collect();
        let mut tracked = HashSet::new();

        for entry in &entries {
            if live.get(entry.signature.as_str()) == Some(&entry.id.as_str()) {
                tracked.insert(entry.id.as_str());
                continue;
            }
            let finding = CacheFinding {
                kind,
                request_id: entry.id.clone(),
                signature: entry.signature.clone(),
            };
            if settling(entry.create_time) {
                report.deferred.push(finding);
                continue;
            }
            if !repair {
                report.orphaned_entries.push(finding);
                continue;
            }
            match apply(store, Repair::DropOrphan(kind, entry)).await {
                Ok(true) => {
                    report.repaired += 1;
                    report.orphaned_entries.push(finding);
                }
                Ok(false) => debug!(kind = %kind, request_id = %entry.id, "Entry settled concurrently"),
                Err(e) if e.is_serialization_failure() => {
                    warn!(kind = %kind, request_id = %entry.id, "Repair lost a write conflict, deferring");
                    report.deferred.push(finding);
                }
                Err(e) => return Err(e),
            }
        }

        for request in &requests {
            // Several tokens may share a request; one entry covers them.
            if !tracked.insert(request.request_id.as_str()) {
                continue;
            }
            let finding = CacheFinding {
                kind,
                request_id: request.request_id.clone(),
                signature: request.signature.clone(),
            };
            if settling(request.create_time) {
                report.deferred.push(finding);
                continue;
            }
            if !repair {
                report.untracked_requests.push(finding);
                continue;
            }
            match apply(store, Repair::Track(kind, request)).await {
                Ok(true) => {
                    report.repaired += 1;
                    report.untracked_requests.push(finding);
                }
                Ok(false) => {
                    debug!(kind = %kind, request_id = %request.request_id, "Request settled concurrently");
                }
                Err(e) if e.is_serialization_failure() => {
                    warn!(kind = %kind, request_id = %request.request_id, "Repair lost a write conflict, deferring");
                    report.deferred.push(finding);
                }
                Err(e) => return Err(e),
            }
        }
    }

    if !report.is_consistent() || !report.deferred.is_empty() {
        info!(
            orphaned = report.orphaned_entries.len(),
            untracked = report.untracked_requests.len(),
            deferred = report.deferred.len(),
            repaired = report.repaired,
            "Session index reconciled"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Client, Requester, to_document};
    use grantstore_db_memory::InMemoryStore;
    use grantstore_storage::Collection;

    async fn stale_entry(store: &InMemoryStore, request_id: &str, signature: &str) -> SessionCacheEntry {
        let ops: &dyn DocumentOps = store;
        StoreSessionCache::for_kind(ops, ArtifactKind::AccessToken)
            .unwrap()
            .create(request_id, signature)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_orphan_repair_rechecks_token() {
        let store = InMemoryStore::new();
        let entry = stale_entry(&store, "req1", "sigA1").await;

        // The token lands after the scan saw the entry as orphaned.
        let mut requester = Requester::new(Client::new("app"));
        requester.id = "req1".to_string();
        let token = Request::from_requester("sigA1", &requester);
        store
            .create(Collection::AccessTokens, to_document(&token).unwrap())
            .await
            .unwrap();

        let fixed = apply(&store, Repair::DropOrphan(ArtifactKind::AccessToken, &entry))
            .await
            .unwrap();
        assert!(!fixed);
        assert_eq!(store.count(Collection::CacheAccessTokens).await, 1);
    }

    #[tokio::test]
    async fn test_orphan_repair_skips_replaced_entry() {
        let store = InMemoryStore::new();
        let stale = stale_entry(&store, "req1", "sigA1").await;
        store
            .delete(Collection::CacheAccessTokens, "req1")
            .await
            .unwrap();
        stale_entry(&store, "req1", "sigA2").await;

        let fixed = apply(&store, Repair::DropOrphan(ArtifactKind::AccessToken, &stale))
            .await
            .unwrap();
        assert!(!fixed);
        assert_eq!(store.count(Collection::CacheAccessTokens).await, 1);
    }

    #[tokio::test]
    async fn test_fresh_findings_are_deferred() {
        let store = InMemoryStore::new();
        stale_entry(&store, "req1", "sigPending").await;

        let report = sweep(&store, true, Duration::from_secs(60)).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(report.repaired, 0);
        assert_eq!(store.count(Collection::CacheAccessTokens).await, 1);

        let report = sweep(&store, true, Duration::ZERO).await.unwrap();
        assert_eq!(report.repaired, 1);
        assert_eq!(store.count(Collection::CacheAccessTokens).await, 0);
    }
}
