//! User directory backed by the `users` collection.

use std::sync::Arc;

use async_trait::async_trait;
use grantstore_storage::{Collection, DocumentFilter, DynEntityStore, StorageError};
use tracing::{debug, instrument, warn};

use crate::directory::{LegacyAuthenticator, UserDirectory};
use crate::hasher::Hasher;
use crate::types::{DirectoryQuery, User, from_document, merge_scopes, strip_scopes, to_document};
use crate::{AuthError, AuthResult};

/// [`UserDirectory`] over any entity store.
#[derive(Clone)]
pub struct StoreUserDirectory {
    store: DynEntityStore,
    hasher: Arc<dyn Hasher>,
}

impl StoreUserDirectory {
    /// Creates a directory over `store`, hashing passwords with `hasher`.
    #[must_use]
    pub fn new(store: DynEntityStore, hasher: Arc<dyn Hasher>) -> Self {
        Self { store, hasher }
    }

    async fn replace(&self, user: &User) -> AuthResult<User> {
        let stored = self
            .store
            .update(Collection::Users, &user.id, to_document(user)?)
            .await
            .map_err(|e| not_found_as(e, &user.id))?;
        from_document(stored)
    }
}

fn not_found_as(err: StorageError, id: &str) -> AuthError {
    if err.is_not_found() {
        AuthError::not_found(format!("user '{id}'"))
    } else {
        err.into()
    }
}

#[async_trait]
impl UserDirectory for StoreUserDirectory {
    async fn get_user(&self, id: &str) -> AuthResult<User> {
        let document = self
            .store
            .get(Collection::Users, id)
            .await
            .map_err(|e| not_found_as(e, id))?;
        from_document(document)
    }

    async fn get_user_by_username(&self, username: &str) -> AuthResult<User> {
        let filter = DocumentFilter::new().equals("username", username);
        let document = self
            .store
            .list(Collection::Users, &filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::not_found(format!("username '{username}'")))?;
        from_document(document)
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn authenticate(&self, username: &str, password: &str) -> AuthResult<User> {
        let user = self.get_user_by_username(username).await?;

        if user.disabled {
            return Err(AuthError::access_denied("user is disabled"));
        }
        let Some(hash) = user.hashed_secret() else {
            return Err(AuthError::access_denied("user has no password"));
        };

        let verdict = self.hasher.compare(hash, password).await;
        match verdict {
            Ok(()) => Ok(user),
            Err(e) => {
                if e.is_server_error() {
                    warn!(user_id = %user.id, error = %e, "Stored password hash unusable");
                }
                Err(AuthError::access_denied("invalid username or password"))
            }
        }
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn create_user(&self, mut user: User) -> AuthResult<User> {
        if user.username.is_empty() {
            return Err(AuthError::invalid_request("username must not be empty"));
        }
        if let Some(password) = user.password.take() {
            user.password = Some(self.hasher.hash(&password).await?);
        }

        let stored = self
            .store
            .create(Collection::Users, to_document(&user)?)
            .await?;
        debug!("User created");
        from_document(stored)
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn update_user(&self, mut user: User) -> AuthResult<User> {
        let existing = self.get_user(&user.id).await?;

        user.password = match user.password.take() {
            None => existing.password,
            Some(password) if existing.password.as_deref() == Some(password.as_str()) => {
                Some(password)
            }
            Some(password) => Some(self.hasher.hash(&password).await?),
        };
        user.create_time = existing.create_time;

        self.replace(&user).await
    }

    async fn delete_user(&self, id: &str) -> AuthResult<()> {
        self.store
            .delete(Collection::Users, id)
            .await
            .map_err(|e| not_found_as(e, id))?;
        debug!(user_id = id, "User deleted");
        Ok(())
    }

    async fn list_users(&self, query: &DirectoryQuery) -> AuthResult<Vec<User>> {
        self.store
            .list(Collection::Users, &query.to_filter())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    async fn grant_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<User> {
        let mut user = self.get_user(id).await?;
        merge_scopes(&mut user.scopes, scopes);
        self.replace(&user).await
    }

    async fn remove_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<User> {
        let mut user = self.get_user(id).await?;
        strip_scopes(&mut user.scopes, scopes);
        self.replace(&user).await
    }

    #[instrument(skip_all, fields(user_id = %user.id))]
    async fn migrate_user(&self, user: User) -> AuthResult<User> {
        match self.replace(&user).await {
            Err(e) if e.is_not_found() => {
                let stored = self
                    .store
                    .create(Collection::Users, to_document(&user)?)
                    .await?;
                debug!("User imported");
                from_document(stored)
            }
            result => result,
        }
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn authenticate_user_migration(
        &self,
        legacy: &dyn LegacyAuthenticator,
        username: &str,
        password: &str,
    ) -> AuthResult<User> {
        let mut user = self.get_user_by_username(username).await?;
        if user.disabled {
            return Err(AuthError::access_denied("user is disabled"));
        }
        if !legacy.authenticate(username, password).await? {
            return Err(AuthError::access_denied("invalid username or password"));
        }

        user.password = Some(self.hasher.hash(password).await?);
        let user = self.replace(&user).await?;
        debug!(user_id = %user.id, "User password migrated");
        Ok(user)
    }
}
