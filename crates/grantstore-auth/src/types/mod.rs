//! Core domain types.
//!
//! All persisted types serialize to camelCase JSON documents. Conversion to
//! and from store documents goes through [`to_document`] and
//! [`from_document`].

mod client;
mod kind;
mod query;
mod records;
mod request;
mod user;

use grantstore_storage::Document;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::AuthResult;

pub use client::{Client, GrantType};
pub use kind::ArtifactKind;
pub use query::{DirectoryQuery, RequestQuery};
pub use records::{DeniedJti, SessionCacheEntry};
pub use request::{Form, Request, Requester, Session};
pub use user::User;

/// Serializes a record into a store document.
///
/// # Errors
///
/// Returns `ServerError` if the record cannot be represented as JSON.
pub fn to_document<T: Serialize>(record: &T) -> AuthResult<Document> {
    Ok(serde_json::to_value(record)?)
}

/// Deserializes a store document into a record.
///
/// # Errors
///
/// Returns `ServerError` if the stored document does not match the record
/// shape.
pub fn from_document<T: DeserializeOwned>(document: Document) -> AuthResult<T> {
    Ok(serde_json::from_value(document)?)
}

/// Adds every scope of `add` missing from `scopes`, keeping order.
pub(crate) fn merge_scopes(scopes: &mut Vec<String>, add: &[String]) {
    for scope in add {
        if !scopes.contains(scope) {
            scopes.push(scope.clone());
        }
    }
}

/// Removes every scope of `remove` from `scopes`.
pub(crate) fn strip_scopes(scopes: &mut Vec<String>, remove: &[String]) {
    scopes.retain(|scope| !remove.contains(scope));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_merging() {
        let mut scopes = vec!["openid".to_string(), "profile".to_string()];
        merge_scopes(&mut scopes, &["profile".to_string(), "offline".to_string()]);
        assert_eq!(scopes, ["openid", "profile", "offline"]);

        strip_scopes(&mut scopes, &["openid".to_string(), "missing".to_string()]);
        assert_eq!(scopes, ["profile", "offline"]);
    }
}
