//! # grantstore-storage
//!
//! Storage abstraction layer for the grantstore OAuth2 artifact store.
//!
//! This crate defines the traits and types that all storage backends must
//! implement. It does not contain any implementations - those are provided by
//! separate crates:
//!
//! - `grantstore-db-memory` - in-memory backend
//! - `grantstore-db-postgres` - PostgreSQL backend
//!
//! ## Overview
//!
//! The main trait is [`EntityStore`], a keyed document store grouped into
//! named [`Collection`]s. Each collection enforces its own unique keys
//! (`id`, plus `signature` or `username` where applicable) and the store's
//! unique-key enforcement is the only concurrency control the layers above
//! rely on.
//!
//! ## Example
//!
//! ```ignore
//! use grantstore_storage::{Collection, DocumentFilter, EntityStore};
//!
//! async fn offline_tokens(store: &dyn EntityStore) -> StorageResult<usize> {
//!     let filter = DocumentFilter::new().all_of("grantedScopes", ["offline"]);
//!     Ok(store.list(Collection::RefreshTokens, &filter).await?.len())
//! }
//! ```

mod collection;
mod document;
mod error;
mod filter;
mod traits;

pub use collection::{Collection, UniqueKey};
pub use document::{
    CREATE_TIME_FIELD, Document, EXPIRY_FIELD, ID_FIELD, UPDATE_TIME_FIELD, i64_field, now_epoch,
    prepare_create, prepare_update, str_field, unique_value,
};
pub use error::{ErrorCategory, StorageError};
pub use filter::{DocumentFilter, Predicate};
pub use traits::{DocumentOps, EntityStore, StoreTransaction};

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shareable store.
pub type DynEntityStore = std::sync::Arc<dyn EntityStore>;
