//! Client and user directories.
//!
//! The lifecycle manager consumes only [`ClientDirectory::get_client`] and
//! [`UserDirectory::authenticate`]; the rest of each trait is the
//! administration surface offered to the protocol engine.
//!
//! # Implementations
//!
//! - [`StoreClientDirectory`] / [`StoreUserDirectory`] - backed by the
//!   `clients` and `users` collections of any `EntityStore`

mod client;
mod user;

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Client, DirectoryQuery, User};

pub use client::StoreClientDirectory;
pub use user::StoreUserDirectory;

/// A caller-supplied check against a legacy credential store.
///
/// Used by the migration path: if the legacy system accepts the secret, the
/// directory re-hashes it under its own hasher.
#[async_trait]
pub trait LegacyAuthenticator: Send + Sync {
    /// Returns `true` if the legacy system accepts `secret` for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the legacy system cannot be reached.
    async fn authenticate(&self, id: &str, secret: &str) -> AuthResult<bool>;
}

#[async_trait]
impl<F> LegacyAuthenticator for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    async fn authenticate(&self, id: &str, secret: &str) -> AuthResult<bool> {
        Ok(self(id, secret))
    }
}

/// Storage and verification of OAuth 2.0 clients.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    /// Resolves a client by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such client exists.
    async fn get_client(&self, id: &str) -> AuthResult<Client>;

    /// Registers a client. `client.secret`, if set, is the plaintext secret.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id is taken.
    async fn create_client(&self, client: Client) -> AuthResult<Client>;

    /// Replaces a client. A `None` secret keeps the stored hash; a new
    /// plaintext secret is hashed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such client exists.
    async fn update_client(&self, client: Client) -> AuthResult<Client>;

    /// Removes a client.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such client exists.
    async fn delete_client(&self, id: &str) -> AuthResult<()>;

    /// Lists clients matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn list_clients(&self, query: &DirectoryQuery) -> AuthResult<Vec<Client>>;

    /// Verifies a client secret.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown clients and `AccessDenied` for disabled
    /// clients, public clients and wrong secrets.
    async fn authenticate_client(&self, id: &str, secret: &str) -> AuthResult<Client>;

    /// Adds scopes to a client.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such client exists.
    async fn grant_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<Client>;

    /// Removes scopes from a client.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such client exists.
    async fn remove_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<Client>;

    /// Upserts a client exported from a legacy system. The secret is stored
    /// verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    async fn migrate_client(&self, client: Client) -> AuthResult<Client>;

    /// Authenticates against `legacy` and, on success, re-hashes the secret
    /// under this directory's hasher.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown clients and `AccessDenied` if the legacy
    /// check fails.
    async fn authenticate_client_migration(
        &self,
        legacy: &dyn LegacyAuthenticator,
        id: &str,
        secret: &str,
    ) -> AuthResult<Client>;
}

/// Storage and verification of end users.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolves a user by id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such user exists.
    async fn get_user(&self, id: &str) -> AuthResult<User>;

    /// Resolves a user by username.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such user exists.
    async fn get_user_by_username(&self, username: &str) -> AuthResult<User>;

    /// Verifies a username and password.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown users and `AccessDenied` for disabled
    /// users and wrong passwords. Comparison errors are never surfaced.
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult<User>;

    /// Creates a user. `user.password`, if set, is the plaintext password.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the id or username is taken.
    async fn create_user(&self, user: User) -> AuthResult<User>;

    /// Replaces a user. A `None` password keeps the stored hash.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such user exists and `Conflict` if the new
    /// username is taken.
    async fn update_user(&self, user: User) -> AuthResult<User>;

    /// Removes a user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such user exists.
    async fn delete_user(&self, id: &str) -> AuthResult<()>;

    /// Lists users matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn list_users(&self, query: &DirectoryQuery) -> AuthResult<Vec<User>>;

    /// Adds scopes to a user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such user exists.
    async fn grant_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<User>;

    /// Removes scopes from a user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such user exists.
    async fn remove_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<User>;

    /// Upserts a user exported from a legacy system. The password hash is
    /// stored verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    async fn migrate_user(&self, user: User) -> AuthResult<User>;

    /// Authenticates against `legacy` and, on success, re-hashes the password
    /// under this directory's hasher.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown users and `AccessDenied` if the legacy
    /// check fails.
    async fn authenticate_user_migration(
        &self,
        legacy: &dyn LegacyAuthenticator,
        username: &str,
        password: &str,
    ) -> AuthResult<User>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_object_safe(
        _: &dyn ClientDirectory,
        _: &dyn UserDirectory,
        _: &dyn LegacyAuthenticator,
    ) {
    }

    #[tokio::test]
    async fn test_closures_are_legacy_authenticators() {
        let legacy = |id: &str, secret: &str| id == "app" && secret == "old";
        assert!(legacy.authenticate("app", "old").await.unwrap());
        assert!(!legacy.authenticate("app", "new").await.unwrap());
    }
}
