//! Explicit transaction envelope over lifecycle operations.

use std::sync::Arc;
use std::time::Duration;

use grantstore_storage::{DocumentOps, StoreTransaction};
use tracing::{Span, debug, instrument};

use crate::directory::ClientDirectory;
use crate::manager::bounded;
use crate::manager::lifecycle::Lifecycle;
use crate::types::{ArtifactKind, Requester};
use crate::{AuthError, AuthResult, redact};

/// Lifecycle operations bound to one store transaction.
///
/// Nothing is visible to other callers until [`commit`](Self::commit).
/// Dropping the transaction without committing rolls it back.
///
/// # Example
///
/// ```ignore
/// let tx = manager.begin().await?;
/// tx.invalidate_authorize_code_session("code-sig").await?;
/// tx.create_session(ArtifactKind::AccessToken, "sigA1", &requester).await?;
/// tx.commit().await?;
/// ```
pub struct RequestTransaction {
    tx: Box<dyn StoreTransaction>,
    clients: Arc<dyn ClientDirectory>,
    timeout: Option<Duration>,
    span: Span,
}

impl RequestTransaction {
    pub(crate) fn new(
        tx: Box<dyn StoreTransaction>,
        clients: Arc<dyn ClientDirectory>,
        timeout: Option<Duration>,
        span: Span,
    ) -> Self {
        Self {
            tx,
            clients,
            timeout,
            span,
        }
    }

    fn lifecycle(&self) -> Lifecycle<'_> {
        let ops: &dyn DocumentOps = &*self.tx;
        Lifecycle::new(ops, &*self.clients)
    }

    #[instrument(parent = &self.span, skip_all, fields(kind = %kind, signature = redact(signature)))]
    pub async fn create_session(
        &self,
        kind: ArtifactKind,
        signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        bounded(
            self.timeout,
            self.lifecycle().create_session(kind, signature, requester),
        )
        .await
    }

    /// Loads a session, seeing this transaction's own writes.
    #[instrument(parent = &self.span, skip_all, fields(kind = %kind, signature = redact(signature)))]
    pub async fn get_session(&self, kind: ArtifactKind, signature: &str) -> AuthResult<Requester> {
        bounded(self.timeout, self.lifecycle().get_session(kind, signature)).await
    }

    #[instrument(parent = &self.span, skip_all, fields(kind = %kind, signature = redact(signature)))]
    pub async fn delete_session(&self, kind: ArtifactKind, signature: &str) -> AuthResult<()> {
        bounded(self.timeout, self.lifecycle().delete_session(kind, signature)).await
    }

    #[instrument(parent = &self.span, skip_all, fields(signature = redact(signature)))]
    pub async fn invalidate_authorize_code_session(&self, signature: &str) -> AuthResult<()> {
        bounded(
            self.timeout,
            self.lifecycle().invalidate_authorize_code(signature),
        )
        .await
    }

    #[instrument(parent = &self.span, skip(self))]
    pub async fn revoke_access_token(&self, request_id: &str) -> AuthResult<()> {
        bounded(
            self.timeout,
            self.lifecycle().revoke(ArtifactKind::AccessToken, request_id),
        )
        .await
    }

    #[instrument(parent = &self.span, skip(self))]
    pub async fn revoke_refresh_token(&self, request_id: &str) -> AuthResult<()> {
        bounded(
            self.timeout,
            self.lifecycle().revoke(ArtifactKind::RefreshToken, request_id),
        )
        .await
    }

    /// Rotation steps of the authorization-code grant, inside this
    /// transaction.
    #[instrument(parent = &self.span, skip_all, fields(code = redact(code_signature)))]
    pub async fn persist_authorize_code_grant_session(
        &self,
        code_signature: &str,
        access_signature: &str,
        refresh_signature: Option<&str>,
        requester: &Requester,
    ) -> AuthResult<()> {
        bounded(
            self.timeout,
            self.lifecycle().rotate(
                ArtifactKind::AuthorizeCode,
                code_signature,
                access_signature,
                refresh_signature,
                requester,
            ),
        )
        .await
    }

    /// Rotation steps of the refresh-token grant, inside this transaction.
    #[instrument(parent = &self.span, skip_all, fields(refresh = redact(old_refresh_signature)))]
    pub async fn persist_refresh_token_grant_session(
        &self,
        old_refresh_signature: &str,
        access_signature: &str,
        refresh_signature: &str,
        requester: &Requester,
    ) -> AuthResult<()> {
        bounded(
            self.timeout,
            self.lifecycle().rotate(
                ArtifactKind::RefreshToken,
                old_refresh_signature,
                access_signature,
                Some(refresh_signature),
                requester,
            ),
        )
        .await
    }

    /// Makes every write of this transaction visible.
    ///
    /// # Errors
    ///
    /// Returns `SerializationFailure` if a concurrent writer won; nothing is
    /// applied in that case.
    pub async fn commit(self) -> AuthResult<()> {
        let Self {
            tx, timeout, span, ..
        } = self;
        bounded(timeout, async move { tx.commit().await.map_err(AuthError::from) }).await?;
        debug!(parent: &span, "Request transaction committed");
        Ok(())
    }

    /// Discards every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the backend fails to roll back.
    pub async fn rollback(self) -> AuthResult<()> {
        let Self { tx, span, .. } = self;
        tx.rollback().await?;
        debug!(parent: &span, "Request transaction rolled back");
        Ok(())
    }
}
