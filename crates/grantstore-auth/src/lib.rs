//! # grantstore-auth
//!
//! Token and session lifecycle management for an OAuth 2.0 / OpenID Connect
//! authorization server.
//!
//! This crate provides:
//! - Persistence of every artifact the protocol engine issues (access tokens,
//!   refresh tokens, authorization codes, OIDC sessions, PKCE sessions)
//! - Revocation by request id through a request-id to signature index
//! - Token rotation for the refresh-token and authorization-code grants
//! - Single-use enforcement for authorization codes and client assertion JWTs
//! - Client and user directories with Argon2id secret hashing
//!
//! ## Modules
//!
//! - [`config`] - Manager and hasher configuration
//! - [`types`] - Requests, requesters, clients, users and index records
//! - [`cache`] - The request-id to signature index
//! - [`directory`] - Client and user directories
//! - [`hasher`] - One-way secret hashing
//! - [`manager`] - The lifecycle manager
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use grantstore_auth::{ArtifactKind, ManagerConfig, RequestManager, Requester};
//!
//! let manager = RequestManager::new(store, clients, users, ManagerConfig::default(), span)?;
//! manager
//!     .create_session(ArtifactKind::AccessToken, "sigA1", &requester)
//!     .await?;
//! manager.revoke_access_token(&requester.id).await?;
//! ```

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod hasher;
pub mod manager;
pub mod types;

use sha2::{Digest, Sha256};

pub use cache::{SessionCache, StoreSessionCache};
pub use config::{ConfigError, HasherConfig, ManagerConfig};
pub use directory::{
    ClientDirectory, LegacyAuthenticator, StoreClientDirectory, StoreUserDirectory, UserDirectory,
};
pub use error::{AuthError, ErrorCategory};
pub use hasher::{Argon2Hasher, Hasher};
pub use manager::{CacheFinding, ReconciliationReport, RequestManager, RequestTransaction};
pub use types::{
    ArtifactKind, Client, DeniedJti, DirectoryQuery, Form, GrantType, Request, RequestQuery,
    Requester, Session, SessionCacheEntry, User,
};

/// Type alias for lifecycle results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prefix of a signature that is safe to log.
pub(crate) fn redact(signature: &str) -> &str {
    let end = signature
        .char_indices()
        .nth(8)
        .map_or(signature.len(), |(index, _)| index);
    &signature[..end]
}

/// Denylist key for a JWT ID. The JTI itself is never stored.
pub(crate) fn jti_signature(jti: &str) -> String {
    hex::encode(Sha256::digest(jti.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(redact("abcdefghijkl"), "abcdefgh");
        assert_eq!(redact("short"), "short");
        assert_eq!(redact("ééééééééé"), "éééééééé");
    }

    #[test]
    fn test_jti_signature_is_sha256_hex() {
        let signature = jti_signature("jti-1");
        assert_eq!(signature.len(), 64);
        assert_ne!(signature, "jti-1");
        assert_eq!(signature, jti_signature("jti-1"));
    }
}
