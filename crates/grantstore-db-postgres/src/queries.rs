//! Statement execution shared by the store and its transactions.
//!
//! Every function runs against a single `PgConnection`, either a pooled
//! connection checked out for one call or the connection owned by an open
//! transaction.

use grantstore_storage::{
    CREATE_TIME_FIELD, Collection, Document, DocumentFilter, EXPIRY_FIELD, ID_FIELD,
    StorageError, StorageResult, UPDATE_TIME_FIELD, UniqueKey, now_epoch, prepare_create,
    prepare_update, str_field, unique_value,
};
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, Postgres};

use crate::error::map_sqlx_error;
use crate::sql::{self, BindValue};

/// Column values lifted out of a prepared document.
struct RowColumns {
    id: String,
    signature: Option<String>,
    username: Option<String>,
    create_time: i64,
    update_time: i64,
    expiry: Option<i64>,
}

impl RowColumns {
    fn from_document(collection: Collection, document: &Document) -> StorageResult<Self> {
        let id = str_field(document, ID_FIELD)
            .ok_or_else(|| StorageError::internal("prepared document has no id"))?
            .to_string();
        let keyed = |key: UniqueKey| {
            collection
                .unique_keys()
                .contains(&key)
                .then(|| unique_value(document, key))
                .flatten()
        };
        let int = |field: &str| document.get(field).and_then(Value::as_i64);

        Ok(Self {
            id,
            signature: keyed(UniqueKey::Signature),
            username: keyed(UniqueKey::Username),
            create_time: int(CREATE_TIME_FIELD).unwrap_or_default(),
            update_time: int(UPDATE_TIME_FIELD).unwrap_or_default(),
            expiry: int(EXPIRY_FIELD),
        })
    }
}

pub(crate) async fn insert(
    conn: &mut PgConnection,
    collection: Collection,
    document: Document,
) -> StorageResult<Document> {
    let prepared = prepare_create(collection, document, now_epoch())?;
    let row = RowColumns::from_document(collection, &prepared)?;
    let statement = sql::insert_sql(collection);

    query_scalar::<Postgres, Value>(&statement)
        .bind(row.id)
        .bind(row.signature)
        .bind(row.username)
        .bind(row.create_time)
        .bind(row.update_time)
        .bind(row.expiry)
        .bind(&prepared)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, Some(collection), Some(&prepared)))
}

pub(crate) async fn fetch_by(
    conn: &mut PgConnection,
    collection: Collection,
    key: UniqueKey,
    value: &str,
) -> StorageResult<Document> {
    let statement = sql::select_sql(collection, key);
    query_scalar::<Postgres, Value>(&statement)
        .bind(value)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, Some(collection), None))?
        .ok_or_else(|| StorageError::not_found(collection.name(), value))
}

/// Full-record replace. Locks the row first, so callers should run this
/// inside a transaction.
pub(crate) async fn replace(
    conn: &mut PgConnection,
    collection: Collection,
    id: &str,
    document: Document,
) -> StorageResult<Document> {
    let lock = sql::select_for_update_sql(collection);
    let existing = query_scalar::<Postgres, Value>(&lock)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, Some(collection), None))?
        .ok_or_else(|| StorageError::not_found(collection.name(), id))?;

    let prepared = prepare_update(collection, id, &existing, document, now_epoch())?;
    let row = RowColumns::from_document(collection, &prepared)?;
    let statement = sql::update_sql(collection);

    query_scalar::<Postgres, Value>(&statement)
        .bind(id)
        .bind(row.signature)
        .bind(row.username)
        .bind(row.update_time)
        .bind(row.expiry)
        .bind(&prepared)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, Some(collection), Some(&prepared)))?
        .ok_or_else(|| StorageError::not_found(collection.name(), id))
}

pub(crate) async fn remove_by(
    conn: &mut PgConnection,
    collection: Collection,
    key: UniqueKey,
    value: &str,
) -> StorageResult<()> {
    let statement = sql::delete_sql(collection, key);
    let result = query::<Postgres>(&statement)
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, Some(collection), None))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(collection.name(), value));
    }
    Ok(())
}

pub(crate) async fn select_filtered(
    conn: &mut PgConnection,
    collection: Collection,
    filter: &DocumentFilter,
) -> StorageResult<Vec<Document>> {
    let clause = sql::where_clause(filter);
    let statement = sql::list_sql(collection, &clause);

    let mut select = query_scalar::<Postgres, Value>(&statement);
    for bind in clause.binds {
        select = match bind {
            BindValue::Text(text) => select.bind(text),
            BindValue::TextArray(values) => select.bind(values),
            BindValue::Json(value) => select.bind(value),
        };
    }

    select
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, Some(collection), None))
}

pub(crate) async fn purge(
    conn: &mut PgConnection,
    collection: Collection,
    cutoff: i64,
) -> StorageResult<u64> {
    let statement = sql::purge_sql(collection);
    let result = query::<Postgres>(&statement)
        .bind(cutoff)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error(e, Some(collection), None))?;
    Ok(result.rows_affected())
}
