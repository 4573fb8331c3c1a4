use std::fmt;

use grantstore_storage::Collection;
use serde::{Deserialize, Serialize};

/// The artifact kinds managed by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// OAuth2 access token.
    AccessToken,
    /// OAuth2 refresh token.
    RefreshToken,
    /// Authorization code (single use).
    AuthorizeCode,
    /// OpenID Connect session.
    OpenIdSession,
    /// PKCE request session.
    PkceSession,
}

impl ArtifactKind {
    /// Every kind, in declaration order.
    pub const ALL: [ArtifactKind; 5] = [
        Self::AccessToken,
        Self::RefreshToken,
        Self::AuthorizeCode,
        Self::OpenIdSession,
        Self::PkceSession,
    ];

    /// Kinds that keep a request-id to signature cache entry.
    pub const CACHED: [ArtifactKind; 2] = [Self::AccessToken, Self::RefreshToken];

    /// Collection holding requests of this kind.
    #[must_use]
    pub fn collection(self) -> Collection {
        match self {
            Self::AccessToken => Collection::AccessTokens,
            Self::RefreshToken => Collection::RefreshTokens,
            Self::AuthorizeCode => Collection::AuthorizationCodes,
            Self::OpenIdSession => Collection::OpenIdSessions,
            Self::PkceSession => Collection::PkceSessions,
        }
    }

    /// Collection holding cache entries, for kinds that have one.
    #[must_use]
    pub fn cache_collection(self) -> Option<Collection> {
        match self {
            Self::AccessToken => Some(Collection::CacheAccessTokens),
            Self::RefreshToken => Some(Collection::CacheRefreshTokens),
            _ => None,
        }
    }

    /// Stable name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
            Self::AuthorizeCode => "authorize_code",
            Self::OpenIdSession => "openid_session",
            Self::PkceSession => "pkce_session",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
