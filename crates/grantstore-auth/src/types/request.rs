//! Persisted requests and the hydrated requester.

use std::collections::BTreeMap;

use grantstore_storage::now_epoch;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::Client;
use crate::{AuthError, AuthResult};

/// Form values carried from the original authorization request.
pub type Form = BTreeMap<String, Vec<String>>;

/// Protocol-engine session payload, stored and returned verbatim.
pub type Session = serde_json::Value;

fn active_by_default() -> bool {
    true
}

/// One issued artifact, as persisted.
///
/// `id` is the document id, assigned by the store. `request_id` is shared by
/// every artifact spawned from the same authorization, which is what lets
/// revocation find related tokens across kinds. Only `signature` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub request_id: String,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    /// Epoch seconds of the original request. Never changes.
    pub requested_at: i64,
    /// Collection-unique key derived from the token value.
    pub signature: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub granted_scopes: Vec<String>,
    #[serde(default)]
    pub requested_audience: Vec<String>,
    #[serde(default)]
    pub granted_audience: Vec<String>,
    #[serde(default)]
    pub form: Form,
    /// Authorization codes only: `false` once redeemed, and stays `false`.
    #[serde(default = "active_by_default")]
    pub active: bool,
    #[serde(default)]
    pub session: Session,
}

impl Request {
    /// Builds the record to persist for `requester` under `signature`.
    #[must_use]
    pub fn from_requester(signature: &str, requester: &Requester) -> Self {
        Self {
            id: String::new(),
            request_id: requester.id.clone(),
            create_time: 0,
            update_time: 0,
            requested_at: requester.requested_at.unix_timestamp(),
            signature: signature.to_string(),
            client_id: requester.client.id.clone(),
            user_id: requester.user_id.clone(),
            scopes: requester.scopes.clone(),
            granted_scopes: requester.granted_scopes.clone(),
            requested_audience: requester.requested_audience.clone(),
            granted_audience: requester.granted_audience.clone(),
            form: requester.form.clone(),
            active: true,
            session: requester.session.clone(),
        }
    }

    /// Hydrates the requester, given the resolved client.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the stored request time is out of range.
    pub fn into_requester(self, client: Client) -> AuthResult<Requester> {
        let requested_at = OffsetDateTime::from_unix_timestamp(self.requested_at).map_err(|e| {
            AuthError::server_error(format!("stored requestedAt out of range: {e}"))
        })?;

        Ok(Requester {
            id: self.request_id,
            requested_at,
            client,
            user_id: self.user_id,
            scopes: self.scopes,
            granted_scopes: self.granted_scopes,
            requested_audience: self.requested_audience,
            granted_audience: self.granted_audience,
            form: self.form,
            session: self.session,
        })
    }
}

/// The authorized request as seen by the protocol engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Requester {
    /// Request id shared by every artifact of one authorization.
    pub id: String,
    pub requested_at: OffsetDateTime,
    pub client: Client,
    /// Subject the request was authorized for, if any.
    pub user_id: Option<String>,
    pub scopes: Vec<String>,
    pub granted_scopes: Vec<String>,
    pub requested_audience: Vec<String>,
    pub granted_audience: Vec<String>,
    pub form: Form,
    pub session: Session,
}

impl Requester {
    /// Starts a new request for `client` with a fresh id, stamped now.
    ///
    /// The timestamp is truncated to whole seconds, the precision it is
    /// stored with.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requested_at: OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(now_epoch()),
            client,
            user_id: None,
            scopes: Vec::new(),
            granted_scopes: Vec::new(),
            requested_audience: Vec::new(),
            granted_audience: Vec::new(),
            form: Form::new(),
            session: Session::Null,
        }
    }

    /// Sets the subject.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the session payload.
    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    /// Grants a scope, once.
    pub fn grant_scope(&mut self, scope: impl Into<String>) {
        let scope = scope.into();
        if !self.granted_scopes.contains(&scope) {
            self.granted_scopes.push(scope);
        }
    }

    /// Grants an audience, once.
    pub fn grant_audience(&mut self, audience: impl Into<String>) {
        let audience = audience.into();
        if !self.granted_audience.contains(&audience) {
            self.granted_audience.push(audience);
        }
    }
}
