//! Shared setup for the lifecycle integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use grantstore_auth::{
    Argon2Hasher, Client, ClientDirectory, GrantType, Hasher, HasherConfig, ManagerConfig,
    RequestManager, Requester, StoreClientDirectory, StoreUserDirectory,
};
use grantstore_db_memory::InMemoryStore;
use serde_json::json;

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub manager: RequestManager,
    pub client: Client,
}

impl Harness {
    /// A fully populated requester for the registered client.
    pub fn requester(&self, id: &str) -> Requester {
        let mut requester = Requester::new(self.client.clone())
            .with_user("alice")
            .with_scopes(["openid", "offline", "profile"])
            .with_session(json!({"subject": "alice", "idToken": {"nonce": "n-0S6"}}));
        requester.id = id.to_string();
        requester.grant_scope("openid");
        requester.grant_scope("offline");
        requester.grant_audience("https://api.example.com");
        requester.form.insert(
            "redirect_uri".to_string(),
            vec!["https://app.example.com/cb".to_string()],
        );
        requester
    }
}

/// Low costs so tests hash quickly.
pub fn cheap_hasher() -> Arc<dyn Hasher> {
    Arc::new(
        Argon2Hasher::new(&HasherConfig {
            memory_cost_kib: 256,
            time_cost: 1,
            parallelism: 1,
        })
        .unwrap(),
    )
}

pub async fn harness(config: ManagerConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let hasher = cheap_hasher();
    let clients = Arc::new(StoreClientDirectory::new(store.clone(), hasher.clone()));
    let users = Arc::new(StoreUserDirectory::new(store.clone(), hasher));

    let client = clients
        .create_client(Client {
            secret: Some("client-secret".to_string()),
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            scopes: vec!["openid".into(), "offline".into(), "profile".into()],
            ..Client::new("app")
        })
        .await
        .unwrap();

    let manager = RequestManager::new(
        store.clone(),
        clients,
        users,
        config,
        tracing::Span::none(),
    )
    .unwrap();

    Harness {
        store,
        manager,
        client,
    }
}
