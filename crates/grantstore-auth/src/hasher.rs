//! Secret hashing.
//!
//! # Security
//!
//! - Hashing uses Argon2id (hybrid mode) with configurable costs
//! - Salts are generated using OsRng (cryptographically secure RNG)
//! - Hashes are stored as PHC strings, so verification reads the costs from
//!   the hash itself and old hashes keep verifying after a cost change
//!
//! Both operations run on the blocking pool.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;

use crate::config::{ConfigError, HasherConfig};
use crate::{AuthError, AuthResult};

/// One-way secret hashing.
#[async_trait]
pub trait Hasher: Send + Sync {
    /// Hashes a plaintext secret for storage.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if hashing fails.
    async fn hash(&self, secret: &str) -> AuthResult<String>;

    /// Checks a plaintext secret against a stored hash.
    ///
    /// # Errors
    ///
    /// Returns `AccessDenied` on mismatch and `ServerError` if the stored hash
    /// is malformed.
    async fn compare(&self, hash: &str, secret: &str) -> AuthResult<()>;
}

/// Argon2id hasher producing PHC strings.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Creates a hasher with the given costs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if Argon2 rejects the costs.
    pub fn new(config: &HasherConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            params: config.params()?,
        })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }
}

#[async_trait]
impl Hasher for Argon2Hasher {
    async fn hash(&self, secret: &str) -> AuthResult<String> {
        let params = self.params.clone();
        let secret = secret.to_owned();

        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::argon2(params)
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
        })
        .await
        .map_err(|e| AuthError::server_error(format!("hashing task failed: {e}")))?
        .map_err(|e| AuthError::server_error(format!("hashing failed: {e}")))
    }

    async fn compare(&self, hash: &str, secret: &str) -> AuthResult<()> {
        let hash = hash.to_owned();
        let secret = secret.to_owned();

        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| AuthError::server_error(format!("malformed secret hash: {e}")))?;
            Argon2::default()
                .verify_password(secret.as_bytes(), &parsed)
                .map_err(|_| AuthError::access_denied("secret mismatch"))
        })
        .await
        .map_err(|e| AuthError::server_error(format!("hashing task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Hasher {
        Argon2Hasher::new(&HasherConfig {
            memory_cost_kib: 256,
            time_cost: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_hash_and_compare() {
        let hasher = cheap();
        let hash = hasher.hash("s3cret").await.unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(hasher.compare(&hash, "s3cret").await.is_ok());
        assert!(
            hasher
                .compare(&hash, "wrong")
                .await
                .unwrap_err()
                .is_access_denied()
        );
    }

    #[tokio::test]
    async fn test_hashes_are_salted() {
        let hasher = cheap();
        let a = hasher.hash("same").await.unwrap();
        let b = hasher.hash("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_verifies_hashes_made_with_other_costs() {
        let hash = Argon2Hasher::default().hash("pw").await.unwrap();
        assert!(cheap().compare(&hash, "pw").await.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_hash_is_server_error() {
        let err = cheap().compare("not-a-phc-string", "pw").await.unwrap_err();
        assert!(err.is_server_error());
    }
}
