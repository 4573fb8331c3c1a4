//! Request-id to signature reverse index.
//!
//! Tokens are otherwise only reachable by signature. The cache lets
//! revocation by request id find the signature to delete. Only access and
//! refresh tokens keep entries.

use async_trait::async_trait;
use grantstore_storage::{Collection, DocumentOps};
use tracing::debug;

use crate::types::{ArtifactKind, SessionCacheEntry, from_document, to_document};
use crate::{AuthError, AuthResult, redact};

/// Reverse index for one artifact kind.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Records that `signature` was issued for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the request id is already tracked. Callers
    /// creating sessions treat that as "already tracked".
    async fn create(&self, request_id: &str, signature: &str) -> AuthResult<SessionCacheEntry>;

    /// Looks up the entry for a request id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the request id is not tracked.
    async fn get(&self, request_id: &str) -> AuthResult<SessionCacheEntry>;

    /// Removes the entry for a request id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the request id is not tracked.
    async fn delete(&self, request_id: &str) -> AuthResult<()>;

    /// Removes whichever entry points at `signature`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no entry points at it.
    async fn delete_by_value(&self, signature: &str) -> AuthResult<()>;

    /// Every entry, for reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn entries(&self) -> AuthResult<Vec<SessionCacheEntry>>;
}

/// [`SessionCache`] over a store or an open store transaction.
#[derive(Clone, Copy)]
pub struct StoreSessionCache<'a> {
    ops: &'a dyn DocumentOps,
    kind: ArtifactKind,
    collection: Collection,
}

impl<'a> StoreSessionCache<'a> {
    /// Cache for `kind`, or `None` if that kind keeps no cache entries.
    #[must_use]
    pub fn for_kind(ops: &'a dyn DocumentOps, kind: ArtifactKind) -> Option<Self> {
        kind.cache_collection().map(|collection| Self {
            ops,
            kind,
            collection,
        })
    }

    /// The artifact kind this cache indexes.
    #[must_use]
    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }
}

#[async_trait]
impl SessionCache for StoreSessionCache<'_> {
    async fn create(&self, request_id: &str, signature: &str) -> AuthResult<SessionCacheEntry> {
        let entry = to_document(&SessionCacheEntry::new(request_id, signature))?;
        let stored = self.ops.create(self.collection, entry).await?;
        debug!(
            kind = %self.kind,
            request_id,
            signature = redact(signature),
            "Cache entry created"
        );
        from_document(stored)
    }

    async fn get(&self, request_id: &str) -> AuthResult<SessionCacheEntry> {
        let document = self.ops.get(self.collection, request_id).await.map_err(|e| {
            if e.is_not_found() {
                AuthError::not_found(format!("no {} tracked for request {request_id}", self.kind))
            } else {
                e.into()
            }
        })?;
        from_document(document)
    }

    async fn delete(&self, request_id: &str) -> AuthResult<()> {
        self.ops.delete(self.collection, request_id).await?;
        Ok(())
    }

    async fn delete_by_value(&self, signature: &str) -> AuthResult<()> {
        self.ops
            .delete_by_signature(self.collection, signature)
            .await?;
        Ok(())
    }

    async fn entries(&self) -> AuthResult<Vec<SessionCacheEntry>> {
        self.ops
            .list(self.collection, &Default::default())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantstore_db_memory::InMemoryStore;

    #[tokio::test]
    async fn test_cache_lifecycle() {
        let store = InMemoryStore::new();
        let cache = StoreSessionCache::for_kind(&store, ArtifactKind::AccessToken).unwrap();

        let entry = cache.create("req1", "sigA1").await.unwrap();
        assert_eq!(entry.id, "req1");
        assert!(entry.create_time > 0);

        assert_eq!(cache.get("req1").await.unwrap().signature, "sigA1");
        assert!(cache.create("req1", "sigA2").await.unwrap_err().is_conflict());

        cache.delete_by_value("sigA1").await.unwrap();
        assert!(cache.get("req1").await.unwrap_err().is_not_found());
        assert!(cache.delete("req1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_caches_are_scoped_per_kind() {
        let store = InMemoryStore::new();
        let access = StoreSessionCache::for_kind(&store, ArtifactKind::AccessToken).unwrap();
        let refresh = StoreSessionCache::for_kind(&store, ArtifactKind::RefreshToken).unwrap();

        access.create("req1", "a").await.unwrap();
        refresh.create("req1", "r").await.unwrap();

        assert_eq!(access.get("req1").await.unwrap().signature, "a");
        assert_eq!(refresh.get("req1").await.unwrap().signature, "r");
        assert_eq!(access.entries().await.unwrap().len(), 1);
    }

    #[test]
    fn test_uncached_kinds() {
        let store = InMemoryStore::new();
        assert!(StoreSessionCache::for_kind(&store, ArtifactKind::AuthorizeCode).is_none());
        assert!(StoreSessionCache::for_kind(&store, ArtifactKind::PkceSession).is_none());
    }
}
