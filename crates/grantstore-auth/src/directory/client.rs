//! Client directory backed by the `clients` collection.

use std::sync::Arc;

use async_trait::async_trait;
use grantstore_storage::{Collection, DynEntityStore};
use tracing::{debug, instrument};

use crate::directory::{ClientDirectory, LegacyAuthenticator};
use crate::hasher::Hasher;
use crate::types::{Client, DirectoryQuery, from_document, merge_scopes, strip_scopes, to_document};
use crate::{AuthError, AuthResult};

/// [`ClientDirectory`] over any entity store.
#[derive(Clone)]
pub struct StoreClientDirectory {
    store: DynEntityStore,
    hasher: Arc<dyn Hasher>,
}

impl StoreClientDirectory {
    /// Creates a directory over `store`, hashing secrets with `hasher`.
    #[must_use]
    pub fn new(store: DynEntityStore, hasher: Arc<dyn Hasher>) -> Self {
        Self { store, hasher }
    }

    /// Writes `client` over the stored record without touching its secret.
    async fn replace(&self, client: &Client) -> AuthResult<Client> {
        let stored = self
            .store
            .update(Collection::Clients, &client.id, to_document(client)?)
            .await
            .map_err(|e| not_found_as(e, &client.id))?;
        from_document(stored)
    }
}

fn not_found_as(err: grantstore_storage::StorageError, id: &str) -> AuthError {
    if err.is_not_found() {
        AuthError::not_found(format!("client '{id}'"))
    } else {
        err.into()
    }
}

#[async_trait]
impl ClientDirectory for StoreClientDirectory {
    async fn get_client(&self, id: &str) -> AuthResult<Client> {
        let document = self
            .store
            .get(Collection::Clients, id)
            .await
            .map_err(|e| not_found_as(e, id))?;
        from_document(document)
    }

    #[instrument(skip_all, fields(client_id = %client.id))]
    async fn create_client(&self, mut client: Client) -> AuthResult<Client> {
        if client.id.is_empty() {
            return Err(AuthError::invalid_request("client id must not be empty"));
        }
        if let Some(secret) = client.secret.take() {
            client.secret = Some(self.hasher.hash(&secret).await?);
        }

        let stored = self
            .store
            .create(Collection::Clients, to_document(&client)?)
            .await?;
        debug!("Client registered");
        from_document(stored)
    }

    #[instrument(skip_all, fields(client_id = %client.id))]
    async fn update_client(&self, mut client: Client) -> AuthResult<Client> {
        let existing = self.get_client(&client.id).await?;

        client.secret = match client.secret.take() {
            None => existing.secret,
            Some(secret) if existing.secret.as_deref() == Some(secret.as_str()) => Some(secret),
            Some(secret) => Some(self.hasher.hash(&secret).await?),
        };
        client.create_time = existing.create_time;

        self.replace(&client).await
    }

    async fn delete_client(&self, id: &str) -> AuthResult<()> {
        self.store
            .delete(Collection::Clients, id)
            .await
            .map_err(|e| not_found_as(e, id))?;
        debug!(client_id = id, "Client deleted");
        Ok(())
    }

    async fn list_clients(&self, query: &DirectoryQuery) -> AuthResult<Vec<Client>> {
        self.store
            .list(Collection::Clients, &query.to_filter())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    #[instrument(skip_all, fields(client_id = id))]
    async fn authenticate_client(&self, id: &str, secret: &str) -> AuthResult<Client> {
        let client = self.get_client(id).await?;

        if client.disabled {
            return Err(AuthError::access_denied("client is disabled"));
        }
        let Some(hash) = client.hashed_secret().filter(|_| !client.public) else {
            return Err(AuthError::access_denied("client has no secret"));
        };

        if let Err(e) = self.hasher.compare(hash, secret).await {
            debug!(error = %e, "Client secret rejected");
            return Err(AuthError::access_denied("invalid client credentials"));
        }
        Ok(client)
    }

    async fn grant_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<Client> {
        let mut client = self.get_client(id).await?;
        merge_scopes(&mut client.scopes, scopes);
        self.replace(&client).await
    }

    async fn remove_scopes(&self, id: &str, scopes: &[String]) -> AuthResult<Client> {
        let mut client = self.get_client(id).await?;
        strip_scopes(&mut client.scopes, scopes);
        self.replace(&client).await
    }

    #[instrument(skip_all, fields(client_id = %client.id))]
    async fn migrate_client(&self, client: Client) -> AuthResult<Client> {
        match self.replace(&client).await {
            Err(e) if e.is_not_found() => {
                let stored = self
                    .store
                    .create(Collection::Clients, to_document(&client)?)
                    .await?;
                debug!("Client imported");
                from_document(stored)
            }
            result => result,
        }
    }

    #[instrument(skip_all, fields(client_id = id))]
    async fn authenticate_client_migration(
        &self,
        legacy: &dyn LegacyAuthenticator,
        id: &str,
        secret: &str,
    ) -> AuthResult<Client> {
        let mut client = self.get_client(id).await?;
        if client.disabled {
            return Err(AuthError::access_denied("client is disabled"));
        }
        if !legacy.authenticate(id, secret).await? {
            return Err(AuthError::access_denied("invalid client credentials"));
        }

        client.secret = Some(self.hasher.hash(secret).await?);
        let client = self.replace(&client).await?;
        debug!("Client secret migrated");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HasherConfig;
    use crate::hasher::Argon2Hasher;
    use grantstore_db_memory::InMemoryStore;

    fn directory() -> StoreClientDirectory {
        let hasher = Argon2Hasher::new(&HasherConfig {
            memory_cost_kib: 256,
            time_cost: 1,
            parallelism: 1,
        })
        .unwrap();
        StoreClientDirectory::new(Arc::new(InMemoryStore::new()), Arc::new(hasher))
    }

    fn confidential(id: &str, secret: &str) -> Client {
        Client {
            secret: Some(secret.to_string()),
            scopes: vec!["openid".into()],
            ..Client::new(id)
        }
    }

    #[tokio::test]
    async fn test_create_hashes_secret() {
        let directory = directory();
        let client = directory
            .create_client(confidential("app", "s3cret"))
            .await
            .unwrap();

        let hash = client.hashed_secret().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(client.create_time > 0);
        assert!(directory.authenticate_client("app", "s3cret").await.is_ok());
    }

    #[tokio::test]
    async fn test_authenticate_client_failures() {
        let directory = directory();
        directory
            .create_client(confidential("app", "s3cret"))
            .await
            .unwrap();

        let err = directory.authenticate_client("app", "nope").await.unwrap_err();
        assert!(err.is_access_denied());

        let err = directory.authenticate_client("ghost", "x").await.unwrap_err();
        assert!(err.is_not_found());

        let mut client = directory.get_client("app").await.unwrap();
        client.disabled = true;
        client.secret = None;
        directory.update_client(client).await.unwrap();
        let err = directory.authenticate_client("app", "s3cret").await.unwrap_err();
        assert!(err.is_access_denied());
    }

    #[tokio::test]
    async fn test_update_keeps_or_rehashes_secret() {
        let directory = directory();
        let created = directory
            .create_client(confidential("app", "first"))
            .await
            .unwrap();

        let mut renamed = created.clone();
        renamed.name = "Renamed".into();
        let updated = directory.update_client(renamed).await.unwrap();
        assert_eq!(updated.secret, created.secret);
        assert_eq!(updated.name, "Renamed");

        let mut rotated = updated.clone();
        rotated.secret = Some("second".into());
        directory.update_client(rotated).await.unwrap();
        assert!(directory.authenticate_client("app", "second").await.is_ok());
        assert!(directory.authenticate_client("app", "first").await.is_err());
    }

    #[tokio::test]
    async fn test_scopes_and_listing() {
        let directory = directory();
        directory.create_client(confidential("a", "x")).await.unwrap();
        directory.create_client(Client::new("b")).await.unwrap();

        let client = directory
            .grant_scopes("b", &["openid".into(), "offline".into()])
            .await
            .unwrap();
        assert_eq!(client.scopes, ["openid", "offline"]);
        directory.remove_scopes("b", &["openid".into()]).await.unwrap();

        let query = DirectoryQuery {
            all_scopes: vec!["openid".into()],
            ..Default::default()
        };
        let ids: Vec<_> = directory
            .list_clients(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, ["a"]);

        directory.delete_client("a").await.unwrap();
        assert!(directory.delete_client("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_migration_rehashes_on_legacy_success() {
        let directory = directory();
        directory
            .migrate_client(Client {
                secret: Some("legacy-hash".into()),
                ..Client::new("old-app")
            })
            .await
            .unwrap();
        assert_eq!(
            directory.get_client("old-app").await.unwrap().secret.as_deref(),
            Some("legacy-hash")
        );

        let legacy = |id: &str, secret: &str| id == "old-app" && secret == "pw";
        let err = directory
            .authenticate_client_migration(&legacy, "old-app", "wrong")
            .await
            .unwrap_err();
        assert!(err.is_access_denied());

        directory
            .authenticate_client_migration(&legacy, "old-app", "pw")
            .await
            .unwrap();
        assert!(directory.authenticate_client("old-app", "pw").await.is_ok());
    }
}
