//! In-memory storage backend for grantstore.
//!
//! This crate provides an in-memory implementation of the `EntityStore` trait
//! from `grantstore-storage`. All collections live behind a single tokio
//! `RwLock`, so unique-key checks and inserts are atomic with respect to each
//! other. Transactions work on a snapshot and replay their writes at commit.
//!
//! # Example
//!
//! ```ignore
//! use grantstore_db_memory::InMemoryStore;
//! use grantstore_storage::{Collection, DocumentOps};
//!
//! let store = InMemoryStore::new();
//! let created = store
//!     .create(Collection::AccessTokens, serde_json::json!({"signature": "sig"}))
//!     .await?;
//! ```

mod fault;
mod state;
mod store;
mod transaction;

pub use fault::{FaultPlan, StoreOp};
pub use store::InMemoryStore;
pub use transaction::InMemoryTransaction;

// Re-export the storage traits for convenience
pub use grantstore_storage::{DocumentOps, EntityStore, StorageError, StoreTransaction};

/// Creates a new in-memory store behind the shared trait object.
pub fn create_entity_store() -> grantstore_storage::DynEntityStore {
    std::sync::Arc::new(InMemoryStore::new())
}
