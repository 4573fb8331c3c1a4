//! Lifecycle operations over one `DocumentOps` handle.
//!
//! The same code runs directly against the store and inside a store
//! transaction; [`RequestManager`](super::RequestManager) and
//! [`RequestTransaction`](super::RequestTransaction) only decide which handle
//! to pass in.

use grantstore_storage::{DocumentOps, StorageError};
use tracing::{debug, warn};

use crate::cache::{SessionCache, StoreSessionCache};
use crate::directory::ClientDirectory;
use crate::types::{
    ArtifactKind, Request, RequestQuery, Requester, from_document, to_document,
};
use crate::{AuthError, AuthResult, redact};

pub(crate) struct Lifecycle<'a> {
    ops: &'a dyn DocumentOps,
    clients: &'a dyn ClientDirectory,
}

fn missing(kind: ArtifactKind, err: StorageError) -> AuthError {
    if err.is_not_found() {
        AuthError::not_found(format!("{kind} not found"))
    } else {
        err.into()
    }
}

fn cache_for<'a>(ops: &'a dyn DocumentOps, kind: ArtifactKind) -> AuthResult<StoreSessionCache<'a>> {
    StoreSessionCache::for_kind(ops, kind).ok_or_else(|| {
        AuthError::invalid_request(format!("{kind} cannot be revoked by request id"))
    })
}

impl<'a> Lifecycle<'a> {
    pub(crate) fn new(ops: &'a dyn DocumentOps, clients: &'a dyn ClientDirectory) -> Self {
        Self { ops, clients }
    }

    /// Writes the request and, for cached kinds, its index entry.
    ///
    /// The two writes run concurrently and are joined before returning. An
    /// index entry that already exists counts as tracked.
    pub(crate) async fn create_session(
        &self,
        kind: ArtifactKind,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        if signature.is_empty() {
            return Err(AuthError::invalid_request("signature must not be empty"));
        }
        if requester.id.is_empty() {
            return Err(AuthError::invalid_request("request id must not be empty"));
        }

        let document = to_document(&Request::from_requester(signature, requester))?;
        let ops = self.ops;
        let primary = async move {
            ops.create(kind.collection(), document).await?;
            Ok::<_, AuthError>(())
        };

        match StoreSessionCache::for_kind(self.ops, kind) {
            Some(cache) => {
                let tracking = async {
                    match cache.create(&requester.id, signature).await {
                        Ok(_) => Ok(true),
                        Err(e) if e.is_conflict() => {
                            warn!(
                                kind = %kind,
                                request_id = %requester.id,
                                "Request already tracked, keeping existing cache entry"
                            );
                            Ok(false)
                        }
                        Err(e) => Err(e),
                    }
                };
                match tokio::join!(primary, tracking) {
                    (Ok(()), Ok(_)) => {}
                    (Err(e), Ok(true)) => {
                        self.discard_entry(kind, &cache, signature, &requester.id)
                            .await;
                        return Err(e);
                    }
                    (Err(e), _) | (_, Err(e)) => return Err(e),
                }
            }
            None => primary.await?,
        }

        debug!(
            kind = %kind,
            request_id = %requester.id,
            signature = redact(signature),
            "Session created"
        );
        Ok(())
    }

    /// Drops an index entry written alongside a failed request write, unless
    /// the signature is stored for this same request.
    async fn discard_entry(
        &self,
        kind: ArtifactKind,
        cache: &StoreSessionCache<'_>,
        signature: &str,
        request_id: &str,
    ) {
        if let Ok(stored) = self.load(kind, signature).await
            && stored.request_id == request_id
        {
            return;
        }
        if let Err(e) = cache.delete(request_id).await {
            warn!(kind = %kind, request_id, error = %e, "Failed to drop cache entry");
        }
    }

    /// Loads the stored request for a signature.
    pub(crate) async fn load(&self, kind: ArtifactKind, signature: &str) -> AuthResult<Request> {
        let document = self
            .ops
            .get_by_signature(kind.collection(), signature)
            .await
            .map_err(|e| missing(kind, e))?;
        from_document(document)
    }

    async fn hydrate(&self, request: Request) -> AuthResult<Requester> {
        let client = self.clients.get_client(&request.client_id).await?;
        request.into_requester(client)
    }

    /// Loads and hydrates a session.
    ///
    /// A redeemed authorization code yields
    /// [`AuthError::InvalidatedAuthorizeCode`] carrying the requester.
    pub(crate) async fn get_session(
        &self,
        kind: ArtifactKind,
        signature: &str,
    ) -> AuthResult<Requester> {
        let request = self.load(kind, signature).await?;
        let redeemed = kind == ArtifactKind::AuthorizeCode && !request.active;
        let requester = self.hydrate(request).await?;

        if redeemed {
            debug!(signature = redact(signature), "Redeemed authorization code presented");
            return Err(AuthError::InvalidatedAuthorizeCode(Box::new(requester)));
        }
        Ok(requester)
    }

    /// Replaces the stored request with the requester's current state.
    pub(crate) async fn update_session(
        &self,
        kind: ArtifactKind,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        let stored = self.load(kind, signature).await?;
        if stored.request_id != requester.id {
            return Err(AuthError::invalid_request(format!(
                "{kind} belongs to request {}, not {}",
                stored.request_id, requester.id
            )));
        }

        let mut request = Request::from_requester(signature, requester);
        request.id.clone_from(&stored.id);
        request.create_time = stored.create_time;
        request.active = stored.active;
        self.ops
            .update(kind.collection(), &stored.id, to_document(&request)?)
            .await
            .map_err(|e| missing(kind, e))?;
        Ok(())
    }

    /// Removes the request and whichever index entry points at it.
    pub(crate) async fn delete_session(&self, kind: ArtifactKind, signature: &str) -> AuthResult<()> {
        let ops = self.ops;
        let primary = async move {
            ops.delete_by_signature(kind.collection(), signature)
                .await
                .map_err(|e| missing(kind, e))
        };

        match StoreSessionCache::for_kind(self.ops, kind) {
            Some(cache) => {
                let untrack = async {
                    match cache.delete_by_value(signature).await {
                        Err(e) if e.is_not_found() => Ok(()),
                        other => other,
                    }
                };
                tokio::try_join!(primary, untrack)?;
            }
            None => primary.await?,
        }

        debug!(kind = %kind, signature = redact(signature), "Session deleted");
        Ok(())
    }

    pub(crate) async fn list_sessions(
        &self,
        kind: ArtifactKind,
        query: &RequestQuery,
    ) -> AuthResult<Vec<Request>> {
        self.ops
            .list(kind.collection(), &query.to_filter())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Marks an authorization code redeemed. Already-redeemed codes are left
    /// as they are.
    pub(crate) async fn invalidate_authorize_code(&self, signature: &str) -> AuthResult<()> {
        let kind = ArtifactKind::AuthorizeCode;
        let mut request = self.load(kind, signature).await?;
        if !request.active {
            return Ok(());
        }

        request.active = false;
        self.ops
            .update(kind.collection(), &request.id, to_document(&request)?)
            .await
            .map_err(|e| missing(kind, e))?;
        debug!(request_id = %request.request_id, "Authorization code invalidated");
        Ok(())
    }

    /// Revokes the live token of `kind` issued for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is tracked for the request id.
    pub(crate) async fn revoke(&self, kind: ArtifactKind, request_id: &str) -> AuthResult<()> {
        let cache = cache_for(self.ops, kind)?;
        let entry = cache.get(request_id).await?;

        match self
            .ops
            .delete_by_signature(kind.collection(), &entry.signature)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                warn!(
                    kind = %kind,
                    request_id,
                    signature = redact(&entry.signature),
                    "Cache entry pointed at a missing token"
                );
            }
            Err(e) => return Err(e.into()),
        }
        match cache.delete(request_id).await {
            // Untracked concurrently; the token is gone either way.
            Err(e) if e.is_not_found() => {}
            other => other?,
        }

        debug!(kind = %kind, request_id, "Token revoked");
        Ok(())
    }

    async fn revoke_if_tracked(&self, kind: ArtifactKind, request_id: &str) -> AuthResult<()> {
        match self.revoke(kind, request_id).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Replaces the tokens of a grant: revoke the old access and refresh
    /// tokens of the request, then issue the new ones.
    pub(crate) async fn rotate(
        &self,
        from: ArtifactKind,
        old_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
        requester: &Requester,
    ) -> AuthResult<()> {
        let request_id = self.load(from, old_signature).await?.request_id;

        self.revoke_if_tracked(ArtifactKind::AccessToken, &request_id)
            .await?;
        self.revoke_if_tracked(ArtifactKind::RefreshToken, &request_id)
            .await?;

        self.create_session(ArtifactKind::AccessToken, access_signature, requester)
            .await?;
        if let Some(refresh_signature) = refresh_signature {
            self.create_session(ArtifactKind::RefreshToken, refresh_signature, requester)
                .await?;
        }

        debug!(from = %from, request_id = %request_id, "Grant rotated");
        Ok(())
    }
}
