//! Logical collections and their unique keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A field that must be unique within a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueKey {
    /// The document `id`. Unique in every collection.
    Id,
    /// The token-derived `signature`.
    Signature,
    /// The login `username` (users only).
    Username,
}

impl UniqueKey {
    /// Returns the JSON field name holding this key.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Signature => "signature",
            Self::Username => "username",
        }
    }
}

/// Every persisted collection.
///
/// The token and session collections hold one `Request` document per issued
/// artifact. The two cache collections hold the request-id to signature
/// reverse index. The denylist holds hashed JWT ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// OpenID Connect sessions, keyed by authorization code signature.
    OpenIdSessions,
    /// Access tokens.
    AccessTokens,
    /// Refresh tokens.
    RefreshTokens,
    /// Authorization codes.
    AuthorizationCodes,
    /// PKCE sessions, keyed by authorization code signature.
    PkceSessions,
    /// OAuth2 clients.
    Clients,
    /// Resource owners.
    Users,
    /// Request id to access token signature index.
    CacheAccessTokens,
    /// Request id to refresh token signature index.
    CacheRefreshTokens,
    /// Denied client assertion JWT ids.
    JtiDenylist,
}

impl Collection {
    /// All collections, in a stable order.
    pub const ALL: [Collection; 10] = [
        Self::OpenIdSessions,
        Self::AccessTokens,
        Self::RefreshTokens,
        Self::AuthorizationCodes,
        Self::PkceSessions,
        Self::Clients,
        Self::Users,
        Self::CacheAccessTokens,
        Self::CacheRefreshTokens,
        Self::JtiDenylist,
    ];

    /// Returns the stable collection name (also the table name in SQL backends).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenIdSessions => "openid_connect_sessions",
            Self::AccessTokens => "access_tokens",
            Self::RefreshTokens => "refresh_tokens",
            Self::AuthorizationCodes => "authorization_codes",
            Self::PkceSessions => "pkce_sessions",
            Self::Clients => "clients",
            Self::Users => "users",
            Self::CacheAccessTokens => "cache_access_tokens",
            Self::CacheRefreshTokens => "cache_refresh_tokens",
            Self::JtiDenylist => "jti_denylist",
        }
    }

    /// Returns the fields that must be unique in this collection.
    #[must_use]
    pub fn unique_keys(&self) -> &'static [UniqueKey] {
        match self {
            Self::Clients => &[UniqueKey::Id],
            Self::Users => &[UniqueKey::Id, UniqueKey::Username],
            _ => &[UniqueKey::Id, UniqueKey::Signature],
        }
    }

    /// Returns `true` if documents in this collection carry a `signature`.
    #[must_use]
    pub fn has_signature(&self) -> bool {
        self.unique_keys().contains(&UniqueKey::Signature)
    }

    /// Returns `true` for the request-id reverse index collections.
    #[must_use]
    pub fn is_cache(&self) -> bool {
        matches!(self, Self::CacheAccessTokens | Self::CacheRefreshTokens)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}
