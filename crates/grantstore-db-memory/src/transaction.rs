//! Snapshot transactions for the in-memory store.
//!
//! A transaction works on a private copy of the data taken at `begin`, and
//! journals every successful write. `commit` replays the journal against the
//! live data under the write lock; if any entry no longer applies (a
//! concurrent writer took the key or removed the document) the whole commit
//! fails with `SerializationFailure` and nothing is applied.

use std::sync::Arc;

use async_trait::async_trait;
use grantstore_storage::{
    Collection, Document, DocumentFilter, DocumentOps, StorageError, StorageResult,
    StoreTransaction, now_epoch,
};
use tokio::sync::{Mutex, RwLock};

use crate::fault::{FaultPlan, StoreOp};
use crate::state::{JournalEntry, State};

struct TxState {
    working: State,
    journal: Vec<JournalEntry>,
}

/// In-memory transaction.
///
/// Uses Mutex for interior mutability so reads and writes can share `&self`.
/// Dropping without commit discards all staged writes.
pub struct InMemoryTransaction {
    live: Arc<RwLock<State>>,
    faults: Arc<FaultPlan>,
    inner: Mutex<Option<TxState>>,
}

impl InMemoryTransaction {
    pub(crate) fn new(live: Arc<RwLock<State>>, snapshot: State, faults: Arc<FaultPlan>) -> Self {
        Self {
            live,
            faults,
            inner: Mutex::new(Some(TxState {
                working: snapshot,
                journal: Vec::new(),
            })),
        }
    }

    fn finished() -> StorageError {
        StorageError::transaction("Transaction already completed (committed or rolled back)")
    }
}

#[async_trait]
impl DocumentOps for InMemoryTransaction {
    async fn create(&self, collection: Collection, document: Document) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Create).await?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        let created = tx.working.create(collection, document, now_epoch())?;
        tx.journal
            .push(JournalEntry::Insert(collection, created.clone()));
        Ok(created)
    }

    async fn get(&self, collection: Collection, id: &str) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Get).await?;
        let guard = self.inner.lock().await;
        let tx = guard.as_ref().ok_or_else(Self::finished)?;
        tx.working.get(collection, id)
    }

    async fn get_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Get).await?;
        let guard = self.inner.lock().await;
        let tx = guard.as_ref().ok_or_else(Self::finished)?;
        tx.working.get_by_signature(collection, signature)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Update).await?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        let updated = tx.working.update(collection, id, document, now_epoch())?;
        tx.journal.push(JournalEntry::Replace(
            collection,
            id.to_string(),
            updated.clone(),
        ));
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        self.faults.check(Some(collection), StoreOp::Delete).await?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        tx.working.delete(collection, id)?;
        tx.journal
            .push(JournalEntry::Remove(collection, id.to_string()));
        Ok(())
    }

    async fn delete_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<()> {
        self.faults.check(Some(collection), StoreOp::Delete).await?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        let id = tx.working.id_for_signature(collection, signature)?;
        tx.working.delete(collection, &id)?;
        tx.journal.push(JournalEntry::Remove(collection, id));
        Ok(())
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &DocumentFilter,
    ) -> StorageResult<Vec<Document>> {
        self.faults.check(Some(collection), StoreOp::List).await?;
        let guard = self.inner.lock().await;
        let tx = guard.as_ref().ok_or_else(Self::finished)?;
        Ok(tx.working.list(collection, filter))
    }

    async fn delete_expired_before(
        &self,
        collection: Collection,
        cutoff: i64,
    ) -> StorageResult<u64> {
        self.faults.check(Some(collection), StoreOp::Purge).await?;
        let mut guard = self.inner.lock().await;
        let tx = guard.as_mut().ok_or_else(Self::finished)?;
        let ids = tx.working.expired_ids(collection, cutoff);
        for id in &ids {
            tx.working.delete(collection, id)?;
            tx.journal
                .push(JournalEntry::Remove(collection, id.clone()));
        }
        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(Self::finished)?;
        self.faults.check(None, StoreOp::Commit).await?;

        let mut live = self.live.write().await;
        let mut next = live.clone();
        for entry in &tx.journal {
            next.apply(entry).map_err(|e| {
                StorageError::serialization_failure(format!(
                    "concurrent write invalidated transaction: {e}"
                ))
            })?;
        }
        *live = next;

        tracing::debug!(writes = tx.journal.len(), "Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        let tx = self.inner.lock().await.take().ok_or_else(Self::finished)?;
        tracing::debug!(discarded = tx.journal.len(), "Transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use grantstore_storage::EntityStore;
    use serde_json::json;

    use super::*;
    use crate::InMemoryStore;

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let store = InMemoryStore::new();
        let tx = store.begin_transaction().await.unwrap();
        tx.create(Collection::AccessTokens, json!({"signature": "t1"}))
            .await
            .unwrap();

        // Uncommitted writes are visible inside the transaction only.
        assert!(
            tx.get_by_signature(Collection::AccessTokens, "t1")
                .await
                .is_ok()
        );
        assert_eq!(store.count(Collection::AccessTokens).await, 0);

        tx.commit().await.unwrap();
        assert_eq!(store.count(Collection::AccessTokens).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryStore::new();
        store
            .create(Collection::RefreshTokens, json!({"signature": "keep"}))
            .await
            .unwrap();

        let tx = store.begin_transaction().await.unwrap();
        tx.delete_by_signature(Collection::RefreshTokens, "keep")
            .await
            .unwrap();
        tx.create(Collection::RefreshTokens, json!({"signature": "new"}))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(
            store
                .get_by_signature(Collection::RefreshTokens, "keep")
                .await
                .is_ok()
        );
        assert!(
            store
                .get_by_signature(Collection::RefreshTokens, "new")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = InMemoryStore::new();
        {
            let tx = store.begin_transaction().await.unwrap();
            tx.create(Collection::Clients, json!({"id": "c1"}))
                .await
                .unwrap();
        }
        assert_eq!(store.count(Collection::Clients).await, 0);
    }

    #[tokio::test]
    async fn test_conflicting_commit_is_serialization_failure() {
        let store = InMemoryStore::new();
        let tx = store.begin_transaction().await.unwrap();
        tx.create(Collection::AccessTokens, json!({"signature": "race"}))
            .await
            .unwrap();

        store
            .create(Collection::AccessTokens, json!({"signature": "race"}))
            .await
            .unwrap();

        let err = tx.commit().await.unwrap_err();
        assert!(err.is_serialization_failure());
        assert_eq!(store.count(Collection::AccessTokens).await, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = InMemoryStore::new();
        let tx = store.begin_transaction().await.unwrap();
        tx.create(Collection::Clients, json!({"id": "c1"}))
            .await
            .unwrap();

        store.faults().fail_next(None, StoreOp::Commit);
        assert!(tx.commit().await.is_err());
        assert_eq!(store.count(Collection::Clients).await, 0);
    }
}
