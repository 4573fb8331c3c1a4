//! Document helpers shared by every backend.
//!
//! Documents are JSON objects with camelCase field names. The store owns the
//! `id`, `createTime` and `updateTime` fields; everything else is opaque to it
//! apart from the unique keys declared by [`Collection::unique_keys`].

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::collection::{Collection, UniqueKey};
use crate::error::StorageError;
use crate::StorageResult;

/// A stored document. Always a JSON object.
pub type Document = Value;

/// Field holding the document id.
pub const ID_FIELD: &str = "id";
/// Field holding the creation time in epoch seconds.
pub const CREATE_TIME_FIELD: &str = "createTime";
/// Field holding the last update time in epoch seconds.
pub const UPDATE_TIME_FIELD: &str = "updateTime";
/// Field holding the expiry time in epoch seconds (denylist entries).
pub const EXPIRY_FIELD: &str = "expiry";

/// Current time as epoch seconds.
#[must_use]
pub fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Reads a string field, treating empty strings as absent.
#[must_use]
pub fn str_field<'a>(document: &'a Document, field: &str) -> Option<&'a str> {
    document
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Reads an integer field, treating zero as absent.
#[must_use]
pub fn i64_field(document: &Document, field: &str) -> Option<i64> {
    document
        .get(field)
        .and_then(Value::as_i64)
        .filter(|v| *v != 0)
}

/// Returns the value of a unique key, if the document carries one.
#[must_use]
pub fn unique_value(document: &Document, key: UniqueKey) -> Option<String> {
    str_field(document, key.field()).map(String::from)
}

fn as_object_mut(document: &mut Document) -> StorageResult<&mut Map<String, Value>> {
    document
        .as_object_mut()
        .ok_or_else(|| StorageError::invalid_document("document must be a JSON object"))
}

/// Assigns server-owned fields before a create.
///
/// Missing `id` gets a fresh UUID, missing `createTime`/`updateTime` get
/// `now`. Collections keyed by signature or username reject documents
/// without one.
///
/// # Errors
///
/// Returns `InvalidDocument` if the document is not an object or lacks a
/// required unique key.
pub fn prepare_create(
    collection: Collection,
    mut document: Document,
    now: i64,
) -> StorageResult<Document> {
    for key in collection.unique_keys() {
        if *key != UniqueKey::Id && str_field(&document, key.field()).is_none() {
            return Err(StorageError::invalid_document(format!(
                "{collection} documents require a non-empty '{}'",
                key.field()
            )));
        }
    }

    let id = str_field(&document, ID_FIELD).map(String::from);
    let create_time = i64_field(&document, CREATE_TIME_FIELD);
    let update_time = i64_field(&document, UPDATE_TIME_FIELD);

    let obj = as_object_mut(&mut document)?;
    obj.insert(
        ID_FIELD.to_string(),
        Value::String(id.unwrap_or_else(|| Uuid::new_v4().to_string())),
    );
    obj.insert(
        CREATE_TIME_FIELD.to_string(),
        Value::from(create_time.unwrap_or(now)),
    );
    obj.insert(
        UPDATE_TIME_FIELD.to_string(),
        Value::from(update_time.unwrap_or(now)),
    );

    Ok(document)
}

/// Prepares a full-record replacement of `existing`.
///
/// The id may not change. `createTime` is carried over when the replacement
/// omits it and `updateTime` is always set to `now`.
///
/// # Errors
///
/// Returns `InvalidDocument` if the replacement names a different id, is not
/// an object, or drops a required unique key.
pub fn prepare_update(
    collection: Collection,
    id: &str,
    existing: &Document,
    mut document: Document,
    now: i64,
) -> StorageResult<Document> {
    if let Some(new_id) = str_field(&document, ID_FIELD)
        && new_id != id
    {
        return Err(StorageError::invalid_document(format!(
            "cannot change id of {collection}/{id} to '{new_id}'"
        )));
    }

    for key in collection.unique_keys() {
        if *key != UniqueKey::Id && str_field(&document, key.field()).is_none() {
            return Err(StorageError::invalid_document(format!(
                "{collection} documents require a non-empty '{}'",
                key.field()
            )));
        }
    }

    let create_time = i64_field(&document, CREATE_TIME_FIELD)
        .or_else(|| i64_field(existing, CREATE_TIME_FIELD))
        .unwrap_or(now);

    let obj = as_object_mut(&mut document)?;
    obj.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    obj.insert(CREATE_TIME_FIELD.to_string(), Value::from(create_time));
    obj.insert(UPDATE_TIME_FIELD.to_string(), Value::from(now));

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prepare_create_assigns_server_fields() {
        let doc = prepare_create(
            Collection::AccessTokens,
            json!({"signature": "sig-1", "scopes": ["openid"]}),
            1_700_000_000,
        )
        .unwrap();

        assert!(str_field(&doc, ID_FIELD).is_some());
        assert_eq!(doc[CREATE_TIME_FIELD], 1_700_000_000);
        assert_eq!(doc[UPDATE_TIME_FIELD], 1_700_000_000);
        assert_eq!(doc["scopes"], json!(["openid"]));
    }

    #[test]
    fn test_prepare_create_keeps_supplied_id() {
        let doc = prepare_create(
            Collection::Clients,
            json!({"id": "client-1", "createTime": 42}),
            100,
        )
        .unwrap();
        assert_eq!(doc[ID_FIELD], "client-1");
        assert_eq!(doc[CREATE_TIME_FIELD], 42);
    }

    #[test]
    fn test_prepare_create_requires_signature() {
        let err = prepare_create(Collection::RefreshTokens, json!({"id": "r"}), 1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument { .. }));

        let err = prepare_create(Collection::Users, json!({"id": "u"}), 1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument { .. }));
    }

    #[test]
    fn test_prepare_create_rejects_non_object() {
        let err = prepare_create(Collection::Clients, json!(["x"]), 1).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument { .. }));
    }

    #[test]
    fn test_prepare_update_denies_id_change() {
        let existing = json!({"id": "c1", "createTime": 5});
        let err = prepare_update(
            Collection::Clients,
            "c1",
            &existing,
            json!({"id": "c2"}),
            10,
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::InvalidDocument { .. }));
    }

    #[test]
    fn test_prepare_update_carries_create_time() {
        let existing = json!({"id": "c1", "createTime": 5, "updateTime": 5});
        let doc = prepare_update(
            Collection::Clients,
            "c1",
            &existing,
            json!({"name": "renamed"}),
            10,
        )
        .unwrap();
        assert_eq!(doc[ID_FIELD], "c1");
        assert_eq!(doc[CREATE_TIME_FIELD], 5);
        assert_eq!(doc[UPDATE_TIME_FIELD], 10);
        assert_eq!(doc["name"], "renamed");
    }
}
