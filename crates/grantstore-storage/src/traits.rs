//! Storage traits that all backends must implement.

use async_trait::async_trait;

use crate::StorageResult;
use crate::collection::Collection;
use crate::document::Document;
use crate::filter::DocumentFilter;

/// Document-level CRUD primitives.
///
/// Shared by [`EntityStore`] and [`StoreTransaction`] so callers can run the
/// same logic directly against the store or inside a transaction.
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait DocumentOps: Send + Sync {
    /// Inserts a new document.
    ///
    /// Assigns `id`, `createTime` and `updateTime` when absent and returns the
    /// stored document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if any unique key of the collection
    /// already exists. Returns `StorageError::InvalidDocument` if a required
    /// unique key is missing.
    async fn create(&self, collection: Collection, document: Document) -> StorageResult<Document>;

    /// Reads a document by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no document has this id.
    async fn get(&self, collection: Collection, id: &str) -> StorageResult<Document>;

    /// Reads a document by signature.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no document has this signature.
    async fn get_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<Document>;

    /// Replaces the whole document with the given id.
    ///
    /// The id cannot change. `updateTime` is set by the store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing matched the id,
    /// `StorageError::Conflict` if the replacement collides on a unique key.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StorageResult<Document>;

    /// Removes the document with the given id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing was removed.
    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<()>;

    /// Removes the document with the given signature.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing was removed.
    async fn delete_by_signature(&self, collection: Collection, signature: &str)
    -> StorageResult<()>;

    /// Lists documents matching the filter.
    async fn list(
        &self,
        collection: Collection,
        filter: &DocumentFilter,
    ) -> StorageResult<Vec<Document>>;

    /// Removes every document whose `expiry` is strictly before `cutoff`.
    ///
    /// Returns the number of documents removed.
    async fn delete_expired_before(&self, collection: Collection, cutoff: i64)
    -> StorageResult<u64>;
}

/// A durable document store.
///
/// One implementation exists per backing technology and is selected at
/// construction time.
///
/// # Example
///
/// ```ignore
/// use grantstore_storage::{Collection, EntityStore};
///
/// async fn token_exists(store: &dyn EntityStore, signature: &str) -> bool {
///     store
///         .get_by_signature(Collection::AccessTokens, signature)
///         .await
///         .is_ok()
/// }
/// ```
#[async_trait]
pub trait EntityStore: DocumentOps {
    /// Begins a new transaction.
    ///
    /// The returned transaction holds one store session for its whole life
    /// and must be committed or rolled back. Dropping it rolls back.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if no session can be acquired and
    /// `StorageError::Transaction` if transactions are unsupported.
    async fn begin_transaction(&self) -> StorageResult<Box<dyn StoreTransaction>>;

    /// Returns whether this backend supports multi-document transactions.
    fn supports_transactions(&self) -> bool;

    /// Returns the name of this backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// A multi-document transaction.
///
/// Reads observe the transaction's own uncommitted writes. Other callers see
/// none of them until `commit` returns.
#[async_trait]
pub trait StoreTransaction: DocumentOps {
    /// Commits all operations in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::SerializationFailure` if a concurrent writer won
    /// and `StorageError::Transaction` if the commit itself failed.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls back all operations in this transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Transaction` if the rollback fails.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_store_object_safe(_: &dyn EntityStore) {}

    fn _assert_transaction_object_safe(_: &dyn StoreTransaction) {}

    fn _assert_ops_object_safe(_: &dyn DocumentOps) {}
}
