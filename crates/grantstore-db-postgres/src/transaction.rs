//! PostgreSQL transactions.

use async_trait::async_trait;
use grantstore_storage::{
    Collection, Document, DocumentFilter, DocumentOps, StorageError, StorageResult,
    StoreTransaction, UniqueKey,
};
use sqlx_postgres::PgTransaction;
use tokio::sync::Mutex;

use crate::error::map_sqlx_error;
use crate::queries;

/// PostgreSQL transaction wrapper.
///
/// Owns one connection for its whole lifetime. Reads see the transaction's
/// own uncommitted writes. Uses Mutex for interior mutability since sqlx
/// requires mutable access to transactions for all operations, including
/// reads. Dropping without commit rolls back.
pub struct PostgresTransaction {
    tx: Mutex<Option<Box<PgTransaction<'static>>>>,
}

impl PostgresTransaction {
    pub(crate) fn new(tx: PgTransaction<'static>) -> Self {
        Self {
            tx: Mutex::new(Some(Box::new(tx))),
        }
    }

    fn finished() -> StorageError {
        StorageError::transaction("Transaction already completed (committed or rolled back)")
    }
}

#[async_trait]
impl DocumentOps for PostgresTransaction {
    async fn create(&self, collection: Collection, document: Document) -> StorageResult<Document> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::insert(tx, collection, document).await
    }

    async fn get(&self, collection: Collection, id: &str) -> StorageResult<Document> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::fetch_by(tx, collection, UniqueKey::Id, id).await
    }

    async fn get_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<Document> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::fetch_by(tx, collection, UniqueKey::Signature, signature).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StorageResult<Document> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::replace(tx, collection, id, document).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::remove_by(tx, collection, UniqueKey::Id, id).await
    }

    async fn delete_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::remove_by(tx, collection, UniqueKey::Signature, signature).await
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &DocumentFilter,
    ) -> StorageResult<Vec<Document>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::select_filtered(tx, collection, filter).await
    }

    async fn delete_expired_before(
        &self,
        collection: Collection,
        cutoff: i64,
    ) -> StorageResult<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_deref_mut().ok_or_else(Self::finished)?;
        queries::purge(tx, collection, cutoff).await
    }
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(Self::finished)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error(e, None, None))?;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(Self::finished)?;
        tx.rollback().await.map_err(|e| {
            StorageError::transaction(format!("Failed to rollback transaction: {e}"))
        })?;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }
}

impl Drop for PostgresTransaction {
    fn drop(&mut self) {
        if self.tx.get_mut().is_some() {
            // sqlx issues the ROLLBACK when the inner transaction drops.
            tracing::warn!("PostgresTransaction dropped without commit or rollback");
        }
    }
}
