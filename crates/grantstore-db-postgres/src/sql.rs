//! SQL text for the document tables.
//!
//! Every collection lives in its own table named after [`Collection::name`].
//! Unique keys are lifted into real columns so PostgreSQL enforces them; the
//! full document is kept in `document`. Field names used in filters are
//! always bound as parameters, never spliced into the SQL text.

use grantstore_storage::{Collection, DocumentFilter, Predicate, UniqueKey};
use serde_json::Value;

/// Column holding a unique key.
pub(crate) fn key_column(key: UniqueKey) -> &'static str {
    match key {
        UniqueKey::Id => "id",
        UniqueKey::Signature => "signature",
        UniqueKey::Username => "username",
    }
}

/// Expected DDL for one collection table.
///
/// Schema provisioning is left to the deployment's migration tooling; this
/// is the shape the queries below rely on.
#[must_use]
pub fn create_table_sql(collection: Collection) -> String {
    let table = collection.name();
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n\
         \x20   id TEXT PRIMARY KEY,\n\
         \x20   signature TEXT UNIQUE,\n\
         \x20   username TEXT UNIQUE,\n\
         \x20   create_time BIGINT NOT NULL,\n\
         \x20   update_time BIGINT NOT NULL,\n\
         \x20   expiry BIGINT,\n\
         \x20   document JSONB NOT NULL\n\
         );\n\
         CREATE INDEX IF NOT EXISTS {table}_expiry_idx ON {table} (expiry);"
    )
}

pub(crate) fn insert_sql(collection: Collection) -> String {
    format!(
        "INSERT INTO {} (id, signature, username, create_time, update_time, expiry, document) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING document",
        collection.name()
    )
}

pub(crate) fn select_sql(collection: Collection, key: UniqueKey) -> String {
    format!(
        "SELECT document FROM {} WHERE {} = $1",
        collection.name(),
        key_column(key)
    )
}

pub(crate) fn select_for_update_sql(collection: Collection) -> String {
    format!(
        "SELECT document FROM {} WHERE id = $1 FOR UPDATE",
        collection.name()
    )
}

pub(crate) fn update_sql(collection: Collection) -> String {
    format!(
        "UPDATE {} SET signature = $2, username = $3, update_time = $4, expiry = $5, document = $6 \
         WHERE id = $1 \
         RETURNING document",
        collection.name()
    )
}

pub(crate) fn delete_sql(collection: Collection, key: UniqueKey) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1",
        collection.name(),
        key_column(key)
    )
}

pub(crate) fn purge_sql(collection: Collection) -> String {
    format!(
        "DELETE FROM {} WHERE expiry IS NOT NULL AND expiry < $1",
        collection.name()
    )
}

/// A value bound into a filter clause.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindValue {
    Text(String),
    TextArray(Vec<String>),
    Json(Value),
}

/// A rendered `WHERE` clause with its bind values, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct WhereClause {
    pub(crate) sql: String,
    pub(crate) binds: Vec<BindValue>,
}

impl WhereClause {
    fn param(&mut self, value: BindValue) -> String {
        self.binds.push(value);
        format!("${}", self.binds.len())
    }
}

/// Renders a filter. No-op predicates are skipped; an empty filter renders
/// to an empty clause.
pub(crate) fn where_clause(filter: &DocumentFilter) -> WhereClause {
    let mut clause = WhereClause::default();
    let mut conditions = Vec::new();

    for predicate in filter.predicates() {
        if predicate.is_noop() {
            continue;
        }
        let condition = match predicate {
            Predicate::AllOf { field, values } => {
                let f = clause.param(BindValue::Text(field.clone()));
                let v = clause.param(BindValue::TextArray(values.clone()));
                format!("(document -> {f}::text) ?& {v}::text[]")
            }
            Predicate::AnyOf { field, values } => {
                let f = clause.param(BindValue::Text(field.clone()));
                let v = clause.param(BindValue::TextArray(values.clone()));
                format!("(document -> {f}::text) ?| {v}::text[]")
            }
            Predicate::Equals { field, value } => {
                let f = clause.param(BindValue::Text(field.clone()));
                let v = clause.param(BindValue::Json(value.clone()));
                format!("(document -> {f}::text) = {v}::jsonb")
            }
        };
        conditions.push(condition);
    }

    if !conditions.is_empty() {
        clause.sql = format!(" WHERE {}", conditions.join(" AND "));
    }
    clause
}

pub(crate) fn list_sql(collection: Collection, clause: &WhereClause) -> String {
    format!(
        "SELECT document FROM {}{} ORDER BY create_time, id",
        collection.name(),
        clause.sql
    )
}
