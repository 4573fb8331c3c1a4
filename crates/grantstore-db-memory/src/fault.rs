//! Fault and latency injection.
//!
//! Lets tests fail a specific store call or slow every call down, to exercise
//! rollback and deadline paths without a real database.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use grantstore_storage::{Collection, StorageError, StorageResult};

/// Store operations that can be failed on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `create`
    Create,
    /// `get` and `get_by_signature`
    Get,
    /// `update`
    Update,
    /// `delete` and `delete_by_signature`
    Delete,
    /// `list`
    List,
    /// `delete_expired_before`
    Purge,
    /// `StoreTransaction::commit`
    Commit,
    /// `EntityStore::begin_transaction`
    Begin,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    collection: Option<Collection>,
    op: StoreOp,
}

/// One-shot failures plus a fixed per-call latency.
#[derive(Debug, Default)]
pub struct FaultPlan {
    pending: Mutex<Vec<Fault>>,
    latency: Mutex<Option<Duration>>,
}

impl FaultPlan {
    /// Fails the next `op` against `collection` (any collection if `None`).
    pub fn fail_next(&self, collection: Option<Collection>, op: StoreOp) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fault { collection, op });
    }

    /// Sleeps this long before every call. `None` disables.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Drops every pending failure and the latency.
    pub fn clear(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.set_latency(None);
    }

    /// Applies latency, then fires a matching pending failure if any.
    pub(crate) async fn check(
        &self,
        collection: Option<Collection>,
        op: StoreOp,
    ) -> StorageResult<()> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let hit = pending.iter().position(|fault| {
            fault.op == op && (fault.collection.is_none() || fault.collection == collection)
        });
        match hit {
            Some(index) => {
                let fault = pending.remove(index);
                tracing::debug!(?fault, "Injected store failure");
                Err(StorageError::internal(format!("injected {op:?} failure")))
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[tokio::test]
    async fn test_fault_fires_once() {
        let plan = FaultPlan::default();
        plan.fail_next(Some(Collection::AccessTokens), StoreOp::Create);

        assert!(
            plan.check(Some(Collection::RefreshTokens), StoreOp::Create)
                .await
                .is_ok()
        );
        assert!(
            plan.check(Some(Collection::AccessTokens), StoreOp::Create)
                .await
                .is_err()
        );
        assert!(
            plan.check(Some(Collection::AccessTokens), StoreOp::Create)
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_wildcard_collection() {
        let plan = FaultPlan::default();
        plan.fail_next(None, StoreOp::Commit);
        block_on(async {
            assert!(plan.check(None, StoreOp::Commit).await.is_err());
            assert!(plan.check(None, StoreOp::Commit).await.is_ok());
        });
    }
}
