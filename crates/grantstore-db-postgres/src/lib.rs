//! PostgreSQL storage backend for grantstore.
//!
//! Implements `EntityStore` from `grantstore-storage` over one JSONB document
//! table per collection. Unique keys (`id`, `signature`, `username`) are
//! lifted into constrained columns, so PostgreSQL arbitrates concurrent
//! creates. Schema provisioning belongs to the deployment; see
//! [`create_table_sql`] for the expected table shape.
//!
//! Driver errors are translated at this boundary: unique violations become
//! `Conflict`, serialization failures and deadlocks become
//! `SerializationFailure`, and pool or socket failures become `Connection`.
//!
//! # Example
//!
//! ```ignore
//! use grantstore_db_postgres::{PostgresConfig, PostgresStore};
//!
//! let store = PostgresStore::connect(&PostgresConfig::new("postgres://localhost/grantstore")).await?;
//! let tx = store.begin_transaction().await?;
//! ```

mod config;
mod error;
mod pool;
mod queries;
mod sql;
mod store;
mod transaction;

use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use config::PostgresConfig;
pub use error::{
    PG_DEADLOCK_DETECTED, PG_SERIALIZATION_FAILURE, PG_UNIQUE_VIOLATION, PostgresError,
};
pub use pool::create_pool;
pub use sql::create_table_sql;
pub use store::PostgresStore;
pub use transaction::PostgresTransaction;
