//! The token and session lifecycle manager.
//!
//! [`RequestManager`] persists every artifact the protocol engine issues,
//! keeps the request-id index used for revocation, rotates tokens on the
//! refresh-token and authorization-code grants, and enforces single use of
//! authorization codes and client assertion JWTs.
//!
//! # Atomicity
//!
//! - Session writes touch the token collection and, for access and refresh
//!   tokens, the index collection. They run concurrently and are joined.
//!   With [`ManagerConfig::transactional_session_writes`] they share one
//!   store transaction; otherwise [`RequestManager::reconcile`] repairs any
//!   divergence.
//! - Rotation runs in one store transaction when
//!   [`ManagerConfig::transactional_rotation`] is set and the backend
//!   supports transactions, and is retried on serialization failures.
//! - [`RequestManager::begin`] opens an explicit envelope for callers that
//!   need several operations to commit together.
//!
//! # Deadlines
//!
//! Every public operation is bounded by
//! [`ManagerConfig::operation_timeout`]. Dropping the returned future
//! cancels every store call in flight.

mod jti;
mod lifecycle;
mod reconcile;
mod transaction;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use grantstore_storage::{DocumentOps, DynEntityStore, StoreTransaction};
use rand::Rng;
use time::OffsetDateTime;
use tracing::{Span, debug, info, instrument, warn};

use crate::config::ManagerConfig;
use crate::directory::{ClientDirectory, UserDirectory};
use crate::types::{ArtifactKind, Request, RequestQuery, Requester, User};
use crate::{AuthError, AuthResult, redact};

use lifecycle::Lifecycle;

pub use reconcile::{CacheFinding, ReconciliationReport};
pub use transaction::RequestTransaction;

/// Runs `operation` under an optional deadline.
pub(crate) async fn bounded<T, F>(limit: Option<Duration>, operation: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .unwrap_or_else(|_| {
                warn!(?limit, "Operation deadline exceeded");
                Err(AuthError::DeadlineExceeded)
            }),
        None => operation.await,
    }
}

/// Commits on success, rolls back on failure.
pub(crate) async fn finish<T>(tx: Box<dyn StoreTransaction>, result: AuthResult<T>) -> AuthResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

/// Random delay in `[0, base * attempt]`.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let ceiling = u64::try_from(base.saturating_mul(attempt).as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
}

/// Token and session lifecycle manager.
///
/// Cheap to clone; clones share the store and directories.
///
/// # Example
///
/// ```ignore
/// let manager = RequestManager::new(store, clients, users, ManagerConfig::default(), span)?;
///
/// manager.create_refresh_token_session("sigR1", &requester).await?;
/// manager
///     .persist_refresh_token_grant_session("sigR1", "sigA2", "sigR2", &requester)
///     .await?;
/// ```
#[derive(Clone)]
pub struct RequestManager {
    store: DynEntityStore,
    clients: Arc<dyn ClientDirectory>,
    users: Arc<dyn UserDirectory>,
    config: ManagerConfig,
    span: Span,
}

impl RequestManager {
    /// Creates a manager.
    ///
    /// `span` becomes the parent of every operation span.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `config` is invalid.
    pub fn new(
        store: DynEntityStore,
        clients: Arc<dyn ClientDirectory>,
        users: Arc<dyn UserDirectory>,
        config: ManagerConfig,
        span: Span,
    ) -> AuthResult<Self> {
        config.validate()?;

        let transactions = store.supports_transactions();
        if config.transactional_rotation && !transactions {
            warn!(
                parent: &span,
                backend = store.backend_name(),
                "Backend has no transactions, rotation will not be atomic"
            );
        }
        info!(
            parent: &span,
            backend = store.backend_name(),
            transactional_rotation = config.transactional_rotation && transactions,
            transactional_session_writes = config.transactional_session_writes && transactions,
            "Request manager ready"
        );

        Ok(Self {
            store,
            clients,
            users,
            config,
            span,
        })
    }

    /// The client directory used to hydrate requesters.
    #[must_use]
    pub fn clients(&self) -> &Arc<dyn ClientDirectory> {
        &self.clients
    }

    /// The user directory used by [`authenticate`](Self::authenticate).
    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(&*self.store, &*self.clients)
    }

    fn timeout(&self) -> Option<Duration> {
        self.config.operation_timeout
    }

    fn transactional(&self, enabled: bool) -> bool {
        enabled && self.store.supports_transactions()
    }

    async fn with_retries<F, Fut>(&self, mut attempt: F) -> AuthResult<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AuthResult<()>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e)
                    if e.is_serialization_failure()
                        && retries < self.config.serialization_retries =>
                {
                    retries += 1;
                    let delay = backoff(self.config.retry_backoff, retries);
                    warn!(retries, ?delay, error = %e, "Transaction conflict, retrying");
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Persists a session of `kind` under `signature`.
    ///
    /// For access and refresh tokens this also records `requester.id` in the
    /// index used for revocation. A request that is already indexed keeps
    /// its existing entry.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the signature already exists; the stored
    /// session is left unchanged.
    #[instrument(parent = &self.span, skip_all, fields(kind = %kind, signature = redact(signature), request_id = %requester.id))]
    pub async fn create_session(
        &self,
        kind: ArtifactKind,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        bounded(self.timeout(), async {
            if self.transactional(self.config.transactional_session_writes) {
                self.with_retries(move || self.create_session_once(kind, signature, requester))
                    .await
            } else {
                self.lifecycle()
                    .create_session(kind, signature, requester)
                    .await
            }
        })
        .await
    }

    async fn create_session_once(
        &self,
        kind: ArtifactKind,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        let tx = self.store.begin_transaction().await?;
        let ops: &dyn DocumentOps = &*tx;
        let result = Lifecycle::new(ops, &*self.clients)
            .create_session(kind, signature, requester)
            .await;
        finish(tx, result).await
    }

    /// Loads the session stored under `signature`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session has this signature, and
    /// `InvalidatedAuthorizeCode` for a redeemed authorization code.
    #[instrument(parent = &self.span, skip_all, fields(kind = %kind, signature = redact(signature)))]
    pub async fn get_session(&self, kind: ArtifactKind, signature: &str) -> AuthResult<Requester> {
        bounded(self.timeout(), self.lifecycle().get_session(kind, signature)).await
    }

    /// Replaces the stored session with the requester's current state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session has this signature and
    /// `InvalidRequest` if it belongs to another request.
    #[instrument(parent = &self.span, skip_all, fields(kind = %kind, signature = redact(signature)))]
    pub async fn update_session(
        &self,
        kind: ArtifactKind,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        bounded(
            self.timeout(),
            self.lifecycle().update_session(kind, signature, requester),
        )
        .await
    }

    /// Removes the session stored under `signature` and its index entry.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no session has this signature.
    #[instrument(parent = &self.span, skip_all, fields(kind = %kind, signature = redact(signature)))]
    pub async fn delete_session(&self, kind: ArtifactKind, signature: &str) -> AuthResult<()> {
        bounded(self.timeout(), self.lifecycle().delete_session(kind, signature)).await
    }

    /// Lists stored sessions of `kind` matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    #[instrument(parent = &self.span, skip(self, query))]
    pub async fn list_sessions(
        &self,
        kind: ArtifactKind,
        query: &RequestQuery,
    ) -> AuthResult<Vec<Request>> {
        bounded(self.timeout(), self.lifecycle().list_sessions(kind, query)).await
    }

    /// Persists an access token session.
    pub async fn create_access_token_session(
        &self,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        self.create_session(ArtifactKind::AccessToken, signature, requester)
            .await
    }

    /// Loads an access token session.
    pub async fn get_access_token_session(&self, signature: &str) -> AuthResult<Requester> {
        self.get_session(ArtifactKind::AccessToken, signature).await
    }

    /// Removes an access token session.
    pub async fn delete_access_token_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(ArtifactKind::AccessToken, signature)
            .await
    }

    /// Persists a refresh token session.
    pub async fn create_refresh_token_session(
        &self,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        self.create_session(ArtifactKind::RefreshToken, signature, requester)
            .await
    }

    /// Loads a refresh token session.
    pub async fn get_refresh_token_session(&self, signature: &str) -> AuthResult<Requester> {
        self.get_session(ArtifactKind::RefreshToken, signature).await
    }

    /// Removes a refresh token session.
    pub async fn delete_refresh_token_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(ArtifactKind::RefreshToken, signature)
            .await
    }

    /// Persists an authorization code session, active.
    pub async fn create_authorize_code_session(
        &self,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        self.create_session(ArtifactKind::AuthorizeCode, signature, requester)
            .await
    }

    /// Loads an authorization code session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidatedAuthorizeCode`] carrying the
    /// requester if the code was already redeemed, so the caller can revoke
    /// every token issued from it.
    pub async fn get_authorize_code_session(&self, signature: &str) -> AuthResult<Requester> {
        self.get_session(ArtifactKind::AuthorizeCode, signature)
            .await
    }

    /// Marks an authorization code redeemed. Repeating it is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no code has this signature.
    #[instrument(parent = &self.span, skip_all, fields(signature = redact(signature)))]
    pub async fn invalidate_authorize_code_session(&self, signature: &str) -> AuthResult<()> {
        bounded(
            self.timeout(),
            self.lifecycle().invalidate_authorize_code(signature),
        )
        .await
    }

    /// Persists an OpenID Connect session, keyed by authorization code.
    pub async fn create_openid_connect_session(
        &self,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        self.create_session(ArtifactKind::OpenIdSession, signature, requester)
            .await
    }

    /// Loads an OpenID Connect session.
    pub async fn get_openid_connect_session(&self, signature: &str) -> AuthResult<Requester> {
        self.get_session(ArtifactKind::OpenIdSession, signature)
            .await
    }

    /// Removes an OpenID Connect session.
    pub async fn delete_openid_connect_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(ArtifactKind::OpenIdSession, signature)
            .await
    }

    /// Persists a PKCE session, keyed by authorization code.
    pub async fn create_pkce_request_session(
        &self,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        self.create_session(ArtifactKind::PkceSession, signature, requester)
            .await
    }

    /// Loads a PKCE session.
    pub async fn get_pkce_request_session(&self, signature: &str) -> AuthResult<Requester> {
        self.get_session(ArtifactKind::PkceSession, signature).await
    }

    /// Removes a PKCE session.
    pub async fn delete_pkce_request_session(&self, signature: &str) -> AuthResult<()> {
        self.delete_session(ArtifactKind::PkceSession, signature)
            .await
    }

    // =========================================================================
    // Revocation and rotation
    // =========================================================================

    /// Revokes the access token issued for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no access token is tracked for the request.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn revoke_access_token(&self, request_id: &str) -> AuthResult<()> {
        bounded(
            self.timeout(),
            self.lifecycle().revoke(ArtifactKind::AccessToken, request_id),
        )
        .await
    }

    /// Revokes the refresh token issued for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no refresh token is tracked for the request.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn revoke_refresh_token(&self, request_id: &str) -> AuthResult<()> {
        bounded(
            self.timeout(),
            self.lifecycle().revoke(ArtifactKind::RefreshToken, request_id),
        )
        .await
    }

    /// Revokes the refresh token issued for `request_id`. No grace period is
    /// kept; this behaves like [`revoke_refresh_token`](Self::revoke_refresh_token).
    pub async fn revoke_refresh_token_maybe_grace_period(
        &self,
        request_id: &str,
        signature: &str,
    ) -> AuthResult<()> {
        debug!(request_id, signature = redact(signature), "No refresh grace period configured");
        self.revoke_refresh_token(request_id).await
    }

    /// Rotates the tokens of an authorization-code grant.
    ///
    /// Revokes any access and refresh token of the code's request, then
    /// issues the new access token and, if given, the new refresh token.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the code does not exist. With transactional
    /// rotation, any failure leaves the store as it was.
    #[instrument(parent = &self.span, skip_all, fields(code = redact(code_signature), request_id = %requester.id))]
    pub async fn persist_authorize_code_grant_session(
        &self,
        code_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
        requester: &Requester,
    ) -> AuthResult<()> {
        bounded(
            self.timeout(),
            self.rotate(
                ArtifactKind::AuthorizeCode,
                code_signature,
                access_signature,
                refresh_signature,
                requester,
            ),
        )
        .await
    }

    /// Rotates the tokens of a refresh-token grant.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the old refresh token does not exist. With
    /// transactional rotation, any failure leaves the store as it was.
    #[instrument(parent = &self.span, skip_all, fields(refresh = redact(old_refresh_signature), request_id = %requester.id))]
    pub async fn persist_refresh_token_grant_session(
        &self,
        old_refresh_signature: &str,
        access_signature: &str,
        refresh_signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        bounded(
            self.timeout(),
            self.rotate(
                ArtifactKind::RefreshToken,
                old_refresh_signature,
                access_signature,
                Some(refresh_signature),
                requester,
            ),
        )
        .await
    }

    async fn rotate(
        &self,
        from: ArtifactKind,
        old_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
        requester: &Requester,
    ) -> AuthResult<()> {
        if !self.transactional(self.config.transactional_rotation) {
            return self
                .lifecycle()
                .rotate(from, old_signature, access_signature, refresh_signature, requester)
                .await;
        }

        self.with_retries(move || {
            self.rotate_once(from, old_signature, access_signature, refresh_signature, requester)
        })
        .await
    }

    async fn rotate_once(
        &self,
        from: ArtifactKind,
        old_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
        requester: &Requester,
    ) -> AuthResult<()> {
        let tx = self.store.begin_transaction().await?;
        let ops: &dyn DocumentOps = &*tx;
        let result = Lifecycle::new(ops, &*self.clients)
            .rotate(from, old_signature, access_signature, refresh_signature, requester)
            .await;
        finish(tx, result).await
    }

    // =========================================================================
    // Authentication and client assertions
    // =========================================================================

    /// Verifies a username and password.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown users and `AccessDenied` for disabled
    /// users and wrong passwords. Store failures propagate.
    #[instrument(parent = &self.span, skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> AuthResult<User> {
        bounded(self.timeout(), async {
            match self.users.authenticate(username, password).await {
                Ok(user) => Ok(user),
                Err(e) if e.is_not_found() || e.is_access_denied() || e.is_server_error() => {
                    Err(e)
                }
                Err(e) => {
                    debug!(error = %e, "Authentication failed");
                    Err(AuthError::access_denied("invalid username or password"))
                }
            }
        })
        .await
    }

    /// Records a client assertion JWT ID as used until `expiry`.
    ///
    /// Expired entries are pruned first.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the JTI is already recorded.
    #[instrument(parent = &self.span, skip_all)]
    pub async fn set_client_assertion_jwt(
        &self,
        jti: &str,
        expiry: OffsetDateTime,
    ) -> AuthResult<()> {
        bounded(self.timeout(), jti::deny(&*self.store, jti, expiry)).await
    }

    /// Checks that a client assertion JWT ID has not been used.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the JTI is recorded and not yet expired.
    #[instrument(parent = &self.span, skip_all)]
    pub async fn client_assertion_jwt_valid(&self, jti: &str) -> AuthResult<()> {
        bounded(self.timeout(), jti::check(&*self.store, jti)).await
    }

    /// Prunes denied JTIs that expired before `cutoff`. Returns how many
    /// were removed.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn delete_denied_jtis_before(&self, cutoff: OffsetDateTime) -> AuthResult<u64> {
        bounded(self.timeout(), jti::purge(&*self.store, cutoff)).await
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Compares access and refresh tokens against their request-id index.
    ///
    /// With `repair`, orphaned index entries are deleted and untracked
    /// tokens are indexed; the report then lists what was fixed. Findings
    /// younger than [`ManagerConfig::reconcile_grace_period`] are deferred.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn reconcile(&self, repair: bool) -> AuthResult<ReconciliationReport> {
        bounded(
            self.timeout(),
            reconcile::sweep(&*self.store, repair, self.config.reconcile_grace_period),
        )
        .await
    }

    /// Opens a transaction for callers that need several lifecycle
    /// operations to commit together.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the backend cannot start a transaction.
    #[instrument(parent = &self.span, skip(self))]
    pub async fn begin(&self) -> AuthResult<RequestTransaction> {
        let tx = bounded(self.timeout(), async {
            self.store
                .begin_transaction()
                .await
                .map_err(AuthError::from)
        })
        .await?;
        Ok(RequestTransaction::new(
            tx,
            Arc::clone(&self.clients),
            self.config.operation_timeout,
            self.span.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_bounded() {
        let base = Duration::from_millis(10);
        for attempt in 1..=5 {
            assert!(backoff(base, attempt) <= base * attempt);
        }
        assert_eq!(backoff(Duration::ZERO, 3), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_bounded_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };
        let err = bounded(Some(Duration::from_millis(10)), slow)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::DeadlineExceeded));

        let value = bounded(None, async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
