//! Error types for token and session lifecycle operations.
//!
//! Every storage failure is translated into [`AuthError`] at the store
//! boundary, so callers never see driver-specific errors.

use std::fmt;

use grantstore_storage::StorageError;

use crate::config::ConfigError;
use crate::types::Requester;

/// Errors returned by the lifecycle manager, session cache and directories.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The requested artifact, client or user does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// A unique key (id, signature, username) already exists.
    #[error("Conflict: {message}")]
    Conflict {
        /// Which key collided.
        message: String,
    },

    /// The account is disabled or the secret did not match.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of why access was denied.
        message: String,
    },

    /// An authorization code was presented after it had been redeemed.
    ///
    /// Carries the hydrated requester so the caller can revoke every token
    /// issued from the original grant.
    #[error("Authorization code has already been used")]
    InvalidatedAuthorizeCode(Box<Requester>),

    /// A transaction could not be committed because of a concurrent write.
    #[error("Serialization failure: {message}")]
    SerializationFailure {
        /// Description from the store.
        message: String,
    },

    /// The caller's deadline elapsed before the operation finished.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// The request is malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what is wrong.
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// Store session setup failed or the store reported an internal error.
    #[error("Server error: {message}")]
    ServerError {
        /// Description of the failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `SerializationFailure` error.
    #[must_use]
    pub fn serialization_failure(message: impl Into<String>) -> Self {
        Self::SerializationFailure {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `ServerError` error.
    #[must_use]
    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a unique-key violation.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Returns `true` if access was denied.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Returns `true` if this is a transaction commit conflict.
    #[must_use]
    pub fn is_serialization_failure(&self) -> bool {
        matches!(self, Self::SerializationFailure { .. })
    }

    /// Returns `true` if an authorization code was reused.
    #[must_use]
    pub fn is_invalidated_authorize_code(&self) -> bool {
        matches!(self, Self::InvalidatedAuthorizeCode(_))
    }

    /// The requester carried by [`AuthError::InvalidatedAuthorizeCode`].
    #[must_use]
    pub fn invalidated_requester(&self) -> Option<&Requester> {
        match self {
            Self::InvalidatedAuthorizeCode(requester) => Some(requester),
            _ => None,
        }
    }

    /// Returns `true` if the caller is at fault (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::AccessDenied { .. }
                | Self::InvalidatedAuthorizeCode(_)
                | Self::InvalidRequest { .. }
        )
    }

    /// Returns `true` if this is a server error (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::SerializationFailure { .. }
                | Self::DeadlineExceeded
                | Self::Configuration { .. }
                | Self::ServerError { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::Lookup,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::AccessDenied { .. } => ErrorCategory::Authentication,
            Self::InvalidatedAuthorizeCode(_) => ErrorCategory::Token,
            Self::SerializationFailure { .. } => ErrorCategory::Concurrency,
            Self::DeadlineExceeded => ErrorCategory::Timeout,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::ServerError { .. } => ErrorCategory::Infrastructure,
        }
    }

    /// Returns the OAuth 2.0 error code for this error.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "invalid_grant",
            Self::Conflict { .. } => "invalid_request",
            Self::AccessDenied { .. } => "access_denied",
            Self::InvalidatedAuthorizeCode(_) => "invalid_grant",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::DeadlineExceeded => "temporarily_unavailable",
            Self::SerializationFailure { .. } => "server_error",
            Self::Configuration { .. } => "server_error",
            Self::ServerError { .. } => "server_error",
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::not_found(err.to_string()),
            StorageError::Conflict { .. } => Self::conflict(err.to_string()),
            StorageError::SerializationFailure { message } => Self::serialization_failure(message),
            StorageError::Connection { .. }
            | StorageError::InvalidDocument { .. }
            | StorageError::Transaction { .. }
            | StorageError::Internal { .. } => Self::server_error(err.to_string()),
        }
    }
}

impl From<ConfigError> for AuthError {
    fn from(err: ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::server_error(format!("Malformed stored record: {err}"))
    }
}

/// Categories of errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Lookup misses.
    Lookup,
    /// Unique-key violations.
    Conflict,
    /// Identity verification failures.
    Authentication,
    /// One-time token reuse.
    Token,
    /// Transaction commit conflicts.
    Concurrency,
    /// Deadline expiry.
    Timeout,
    /// Request validation errors.
    Validation,
    /// Configuration errors.
    Configuration,
    /// Infrastructure/storage errors.
    Infrastructure,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lookup => write!(f, "lookup"),
            Self::Conflict => write!(f, "conflict"),
            Self::Authentication => write!(f, "authentication"),
            Self::Token => write!(f, "token"),
            Self::Concurrency => write!(f, "concurrency"),
            Self::Timeout => write!(f, "timeout"),
            Self::Validation => write!(f, "validation"),
            Self::Configuration => write!(f, "configuration"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}
