use async_trait::async_trait;
use grantstore_storage::{
    Collection, Document, DocumentFilter, DocumentOps, EntityStore, StorageResult,
    StoreTransaction, UniqueKey,
};
use sqlx_core::pool::PoolConnection;
use sqlx_core::query::query;
use sqlx_postgres::Postgres;
use tracing::instrument;

use crate::PgPool;
use crate::config::PostgresConfig;
use crate::error::{PostgresError, map_sqlx_error};
use crate::pool::create_pool;
use crate::queries;
use crate::transaction::PostgresTransaction;

/// PostgreSQL-backed document store.
///
/// Each call checks out one pooled connection and returns it on every exit
/// path. Unique keys are enforced by the table constraints, so racing creates
/// on one signature yield exactly one success and `Conflict` for the rest.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    serializable: bool,
}

impl PostgresStore {
    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            serializable: true,
        }
    }

    /// Connects using the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database is
    /// unreachable.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, PostgresError> {
        let pool = create_pool(config).await?;
        Ok(Self {
            pool,
            serializable: config.serializable_transactions,
        })
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn connection(&self) -> StorageResult<PoolConnection<Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error(e, None, None))
    }
}

#[async_trait]
impl DocumentOps for PostgresStore {
    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn create(&self, collection: Collection, document: Document) -> StorageResult<Document> {
        let mut conn = self.connection().await?;
        queries::insert(&mut conn, collection, document).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn get(&self, collection: Collection, id: &str) -> StorageResult<Document> {
        let mut conn = self.connection().await?;
        queries::fetch_by(&mut conn, collection, UniqueKey::Id, id).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn get_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<Document> {
        let mut conn = self.connection().await?;
        queries::fetch_by(&mut conn, collection, UniqueKey::Signature, signature).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        document: Document,
    ) -> StorageResult<Document> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, None, None))?;
        let updated = queries::replace(&mut tx, collection, id, document).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error(e, Some(collection), None))?;
        Ok(updated)
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn delete(&self, collection: Collection, id: &str) -> StorageResult<()> {
        let mut conn = self.connection().await?;
        queries::remove_by(&mut conn, collection, UniqueKey::Id, id).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn delete_by_signature(
        &self,
        collection: Collection,
        signature: &str,
    ) -> StorageResult<()> {
        let mut conn = self.connection().await?;
        queries::remove_by(&mut conn, collection, UniqueKey::Signature, signature).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection))]
    async fn list(
        &self,
        collection: Collection,
        filter: &DocumentFilter,
    ) -> StorageResult<Vec<Document>> {
        let mut conn = self.connection().await?;
        queries::select_filtered(&mut conn, collection, filter).await
    }

    #[instrument(level = "debug", skip_all, fields(collection = %collection, cutoff = cutoff))]
    async fn delete_expired_before(
        &self,
        collection: Collection,
        cutoff: i64,
    ) -> StorageResult<u64> {
        let mut conn = self.connection().await?;
        queries::purge(&mut conn, collection, cutoff).await
    }
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn begin_transaction(&self) -> StorageResult<Box<dyn StoreTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, None, None))?;
        if self.serializable {
            query::<Postgres>("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error(e, None, None))?;
        }
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
