//! Client assertion JWT replay protection.
//!
//! Used JTIs are kept in the denylist under their SHA-256 digest until they
//! expire.

use grantstore_storage::{Collection, DocumentOps, now_epoch};
use time::OffsetDateTime;
use tracing::debug;

use crate::types::{DeniedJti, from_document, to_document};
use crate::{AuthError, AuthResult, jti_signature};

pub(crate) async fn deny(ops: &dyn DocumentOps, jti: &str, expiry: OffsetDateTime) -> AuthResult<()> {
    // Entries expiring this second are already expired.
    let pruned = ops
        .delete_expired_before(Collection::JtiDenylist, now_epoch() + 1)
        .await?;
    if pruned > 0 {
        debug!(pruned, "Expired JTIs pruned");
    }

    let entry = DeniedJti::new(jti_signature(jti), expiry.unix_timestamp());
    ops.create(Collection::JtiDenylist, to_document(&entry)?)
        .await
        .map_err(|e| {
            if e.is_conflict() {
                AuthError::conflict("JTI has already been used")
            } else {
                e.into()
            }
        })?;
    Ok(())
}

pub(crate) async fn check(ops: &dyn DocumentOps, jti: &str) -> AuthResult<()> {
    let document = match ops
        .get_by_signature(Collection::JtiDenylist, &jti_signature(jti))
        .await
    {
        Ok(document) => document,
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let entry: DeniedJti = from_document(document)?;
    if entry.is_expired(now_epoch()) {
        Ok(())
    } else {
        Err(AuthError::conflict("JTI has already been used"))
    }
}

pub(crate) async fn purge(ops: &dyn DocumentOps, cutoff: OffsetDateTime) -> AuthResult<u64> {
    Ok(ops
        .delete_expired_before(Collection::JtiDenylist, cutoff.unix_timestamp())
        .await?)
}
