use std::sync::Arc;

use async_trait::async_trait;
use grantstore_storage::{
    Collection, Document, DocumentFilter, DocumentOps, EntityStore, StorageResult,
    StoreTransaction, now_epoch,
};
use tokio::sync::RwLock;

use crate::fault::{FaultPlan, StoreOp};
use crate::state::State;
use crate::transaction::InMemoryTransaction;

/// In-memory document store.
///
/// This storage implementation provides:
/// - Per-collection unique indexes on `id`, `signature` and `username`
/// - Atomic check-and-insert, so racing creates on one key yield exactly one
///   success
/// - Snapshot transactions with commit-time conflict detection
/// - Fault and latency injection for tests via [`InMemoryStore::faults`]
///
/// Cloning is cheap and clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    faults: Arc<FaultPlan>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fault plan shared by this store and its transactions.
    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: Collection) -> usize {
        self.state.read().await.count(collection)
    }
}

#[async_trait]
impl DocumentOps for InMemoryStore {
    async fn create(&self, collection: Collection, document: Document) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Create).await?;
        let mut state = self.state.write().await;
        state.create(collection, document, now_epoch())
    }

    async fn get(&self, collection: Collection, id: &str) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Get).await?;
        self.state.read().await.get(collection, id)
    }

    async fn get_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Get).await?;
        self.state.read().await.get_by_signature(collection, signature)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StorageResult<Document> {
        self.faults.check(Some(collection), StoreOp::Update).await?;
        let mut state = self.state.write().await;
        state.update(collection, id, document, now_epoch())
    }

    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        self.faults.check(Some(collection), StoreOp::Delete).await?;
        self.state.write().await.delete(collection, id)
    }

    async fn delete_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<()> {
        self.faults.check(Some(collection), StoreOp::Delete).await?;
        let mut state = self.state.write().await;
        let id = state.id_for_signature(collection, signature)?;
        state.delete(collection, &id)
    }

    async fn list(
        &self,
        collection: Collection,
        filter: &DocumentFilter,
    ) -> StorageResult<Vec<Document>> {
        self.faults.check(Some(collection), StoreOp::List).await?;
        Ok(self.state.read().await.list(collection, filter))
    }

    async fn delete_expired_before(
        &self,
        collection: Collection,
        cutoff: i64,
    ) -> StorageResult<u64> {
        self.faults.check(Some(collection), StoreOp::Purge).await?;
        let mut state = self.state.write().await;
        let ids = state.expired_ids(collection, cutoff);
        for id in &ids {
            state.delete(collection, id)?;
        }
        Ok(ids.len() as u64)
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn begin_transaction(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        self.faults.check(None, StoreOp::Begin).await?;
        let snapshot = self.state.read().await.clone();
        Ok(Box::new(InMemoryTransaction::new(
            Arc::clone(&self.state),
            snapshot,
            Arc::clone(&self.faults),
        )))
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
