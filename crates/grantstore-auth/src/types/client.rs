//! OAuth 2.0 client registrations.

use serde::{Deserialize, Serialize};

/// OAuth 2.0 grant types.
///
/// Defines the authorization flows a client is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization Code flow (with PKCE for public clients).
    AuthorizationCode,
    /// Implicit flow.
    Implicit,
    /// Client Credentials flow (confidential clients only).
    ClientCredentials,
    /// Refresh Token flow.
    RefreshToken,
    /// Resource Owner Password Credentials flow.
    Password,
}

impl GrantType {
    /// Returns the OAuth 2.0 grant_type parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Implicit => "implicit",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// OAuth 2.0 client record.
///
/// `secret` holds the Argon2 PHC hash once stored. When passed to
/// `ClientDirectory::create_client` or `update_client` it holds the
/// plaintext secret to hash.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Client identifier used in OAuth flows.
    pub id: String,

    /// Human-readable display name.
    #[serde(default)]
    pub name: String,

    /// Hashed client secret. Public clients have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Registered redirect URIs.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Grant types this client is allowed to use.
    #[serde(default)]
    pub grant_types: Vec<GrantType>,

    /// Response types this client is allowed to request.
    #[serde(default)]
    pub response_types: Vec<String>,

    /// Scopes this client may request.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Audiences this client may request.
    #[serde(default)]
    pub audience: Vec<String>,

    /// Public clients cannot keep a secret.
    #[serde(default)]
    pub public: bool,

    /// Disabled clients fail authentication.
    #[serde(default)]
    pub disabled: bool,

    /// Epoch seconds, assigned by the store.
    #[serde(default)]
    pub create_time: i64,

    /// Epoch seconds, assigned by the store.
    #[serde(default)]
    pub update_time: i64,
}

impl Client {
    /// Creates a confidential, enabled client with no grants.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Returns the hashed secret, if any.
    #[must_use]
    pub fn hashed_secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// Returns `true` if the client may use `grant`.
    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }
}
