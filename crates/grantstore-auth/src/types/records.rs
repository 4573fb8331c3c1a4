use serde::{Deserialize, Serialize};

/// Reverse index entry: request id to the signature issued for it.
///
/// `id` is the request id. One entry exists per (kind, request id) while the
/// artifact it shadows is live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCacheEntry {
    pub id: String,
    pub signature: String,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
}

impl SessionCacheEntry {
    #[must_use]
    pub fn new(request_id: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            id: request_id.into(),
            signature: signature.into(),
            create_time: 0,
            update_time: 0,
        }
    }
}

/// A denied JWT ID, pruned by expiry.
///
/// `signature` is the SHA-256 hex digest of the JTI, never the JTI itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedJti {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub signature: String,
    /// Epoch seconds after which the entry may be pruned.
    pub expiry: i64,
}

impl DeniedJti {
    #[must_use]
    pub fn new(signature: impl Into<String>, expiry: i64) -> Self {
        Self {
            id: String::new(),
            signature: signature.into(),
            expiry,
        }
    }

    /// Returns `true` once `now` has passed the expiry.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.expiry <= now
    }
}
