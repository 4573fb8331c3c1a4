//! Error types for the PostgreSQL storage backend.

use grantstore_storage::{Collection, Document, StorageError, UniqueKey, unique_value};
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for serialization failure (40001).
pub const PG_SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL error code for deadlock detected (40P01).
pub const PG_DEADLOCK_DETECTED: &str = "40P01";

/// Errors specific to setting up the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StorageError::connection(e.to_string()),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// How a database error code maps onto the storage taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlState {
    UniqueViolation(UniqueKey),
    SerializationFailure,
    Other,
}

/// Classifies a SQLSTATE plus the violated constraint name, if any.
///
/// Constraint names follow the PostgreSQL defaults: `<table>_pkey`,
/// `<table>_signature_key`, `<table>_username_key`.
pub(crate) fn classify(code: Option<&str>, constraint: Option<&str>) -> SqlState {
    match code {
        Some(PG_UNIQUE_VIOLATION) => {
            let key = match constraint {
                Some(c) if c.contains("signature") => UniqueKey::Signature,
                Some(c) if c.contains("username") => UniqueKey::Username,
                _ => UniqueKey::Id,
            };
            SqlState::UniqueViolation(key)
        }
        Some(PG_SERIALIZATION_FAILURE | PG_DEADLOCK_DETECTED) => SqlState::SerializationFailure,
        _ => SqlState::Other,
    }
}

/// Returns `true` for errors that mean no usable connection.
pub(crate) fn is_connection_failure(err: &SqlxError) -> bool {
    matches!(
        err,
        SqlxError::PoolTimedOut
            | SqlxError::PoolClosed
            | SqlxError::Io(_)
            | SqlxError::Tls(_)
            | SqlxError::WorkerCrashed
    )
}

/// Translates a driver error into the storage taxonomy.
///
/// `document` is the document being written, used to report the conflicting
/// key value.
pub(crate) fn map_sqlx_error(
    err: SqlxError,
    collection: Option<Collection>,
    document: Option<&Document>,
) -> StorageError {
    if let SqlxError::Database(ref db_err) = err {
        let code = db_err.code();
        return match classify(code.as_deref(), db_err.constraint()) {
            SqlState::UniqueViolation(key) => {
                let value = document
                    .and_then(|doc| unique_value(doc, key))
                    .unwrap_or_default();
                let name = collection.map_or("transaction", |c| c.name());
                StorageError::conflict(name, key.field(), value)
            }
            SqlState::SerializationFailure => {
                StorageError::serialization_failure(db_err.message().to_string())
            }
            SqlState::Other => StorageError::internal(format!("Database error: {db_err}")),
        };
    }

    if is_connection_failure(&err) {
        return StorageError::connection(err.to_string());
    }

    StorageError::internal(format!("Database error: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unique_violation_by_constraint() {
        assert_eq!(
            classify(Some("23505"), Some("access_tokens_signature_key")),
            SqlState::UniqueViolation(UniqueKey::Signature)
        );
        assert_eq!(
            classify(Some("23505"), Some("users_username_key")),
            SqlState::UniqueViolation(UniqueKey::Username)
        );
        assert_eq!(
            classify(Some("23505"), Some("clients_pkey")),
            SqlState::UniqueViolation(UniqueKey::Id)
        );
        assert_eq!(
            classify(Some("23505"), None),
            SqlState::UniqueViolation(UniqueKey::Id)
        );
    }

    #[test]
    fn test_classify_serialization_codes() {
        assert_eq!(classify(Some("40001"), None), SqlState::SerializationFailure);
        assert_eq!(classify(Some("40P01"), None), SqlState::SerializationFailure);
        assert_eq!(classify(Some("42P01"), None), SqlState::Other);
        assert_eq!(classify(None, None), SqlState::Other);
    }

    #[test]
    fn test_pool_errors_are_connection_errors() {
        let err = map_sqlx_error(SqlxError::PoolTimedOut, Some(Collection::AccessTokens), None);
        assert!(err.is_connection_error());

        let err = map_sqlx_error(SqlxError::PoolClosed, None, None);
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err = map_sqlx_error(SqlxError::RowNotFound, None, None);
        assert!(matches!(err, StorageError::Internal { .. }));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: StorageError = PostgresError::config("bad url").into();
        assert!(err.to_string().contains("bad url"));
    }
}
