//! Storage error types for the document storage layer.
//!
//! Every backend translates its driver-specific failures into this taxonomy
//! before returning. Nothing driver-specific crosses this boundary.

use std::fmt;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No document matched the lookup.
    #[error("Document not found: {collection}/{key}")]
    NotFound {
        /// The collection that was searched.
        collection: String,
        /// The id or signature that was looked up.
        key: String,
    },

    /// A create or replace would violate a unique key.
    #[error("Conflict in {collection}: {field} '{value}' already exists")]
    Conflict {
        /// The collection holding the conflicting document.
        collection: String,
        /// The unique field that collided (`id`, `signature`, `username`).
        field: String,
        /// The colliding value.
        value: String,
    },

    /// A transaction could not be committed because of a concurrent write.
    #[error("Serialization failure: {message}")]
    SerializationFailure {
        /// Description of the conflicting write.
        message: String,
    },

    /// A store session or connection could not be acquired.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The document is malformed or tries an illegal mutation.
    #[error("Invalid document: {message}")]
    InvalidDocument {
        /// Description of why the document is invalid.
        message: String,
    },

    /// The transaction was already finished or could not be started.
    #[error("Transaction error: {message}")]
    Transaction {
        /// Description of the transaction error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(
        collection: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            collection: collection.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// Creates a new `SerializationFailure` error.
    #[must_use]
    pub fn serialization_failure(message: impl Into<String>) -> Self {
        Self::SerializationFailure {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidDocument` error.
    #[must_use]
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }

    /// Creates a new `Transaction` error.
    #[must_use]
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a not found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a unique-key conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if this is a transaction serialization failure.
    #[must_use]
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, Self::SerializationFailure { .. })
    }

    /// Returns `true` if the store could not be reached at all.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::SerializationFailure { .. } => ErrorCategory::Transaction,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::InvalidDocument { .. } => ErrorCategory::Validation,
            Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_document(err.to_string())
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Document not found.
    NotFound,
    /// Unique-key conflict.
    Conflict,
    /// Validation error.
    Validation,
    /// Transaction-related error.
    Transaction,
    /// Infrastructure/connection error.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Transaction => write!(f, "transaction"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::not_found("access_tokens", "sig-1");
        assert_eq!(err.to_string(), "Document not found: access_tokens/sig-1");

        let err = StorageError::conflict("refresh_tokens", "signature", "sig-2");
        assert_eq!(
            err.to_string(),
            "Conflict in refresh_tokens: signature 'sig-2' already exists"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = StorageError::not_found("users", "u1");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let err = StorageError::conflict("users", "username", "alice");
        assert!(err.is_conflict());
        assert!(!err.is_not_found());

        assert!(StorageError::serialization_failure("write skew").is_serialization_failure());
        assert!(StorageError::connection("pool closed").is_connection_error());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::not_found("clients", "c").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::conflict("clients", "id", "c").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::serialization_failure("x").category(),
            ErrorCategory::Transaction
        );
        assert_eq!(
            StorageError::connection("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Conflict.to_string(), "conflict");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = StorageError::from(json_err);
        assert!(matches!(err, StorageError::InvalidDocument { .. }));
    }
}
