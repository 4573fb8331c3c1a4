use serde::{Deserialize, Serialize};

/// End-user record.
///
/// `password` holds the Argon2 PHC hash once stored, or the plaintext when
/// passed to `UserDirectory::create_user`/`update_user`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable user identifier.
    pub id: String,
    /// Login name, unique across users.
    pub username: String,
    /// Hashed password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Scopes granted to this user.
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    /// Disabled users fail authentication.
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
}

impl User {
    /// Creates an enabled user.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// Returns the hashed password, if any.
    #[must_use]
    pub fn hashed_secret(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Full name for display.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
