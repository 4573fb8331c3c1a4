//! Lifecycle manager and hasher configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! [manager]
//! transactional_rotation = true
//! operation_timeout = "5s"
//!
//! [hasher]
//! memory_cost_kib = 19456
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for [`RequestManager`](crate::RequestManager).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Run token rotation inside one store transaction when the backend
    /// supports transactions. On failure nothing of the rotation persists.
    pub transactional_rotation: bool,

    /// Write the request and its cache entry inside one store transaction.
    /// Off by default; the two writes are then issued concurrently and the
    /// reconciliation sweep repairs any divergence.
    pub transactional_session_writes: bool,

    /// Upper bound for every public operation. `None` disables the bound.
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Option<Duration>,

    /// How often a transactional rotation is retried after a commit
    /// conflict.
    pub serialization_retries: u32,

    /// Base delay between rotation retries. Each retry waits a random
    /// fraction of `retry_backoff * attempt`.
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Findings younger than this are left for a later reconciliation
    /// sweep, so writes still in flight are not mistaken for divergence.
    #[serde(with = "humantime_serde")]
    pub reconcile_grace_period: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            transactional_rotation: true,
            transactional_session_writes: false,
            operation_timeout: Some(Duration::from_secs(30)),
            serialization_retries: 3,
            retry_backoff: Duration::from_millis(20),
            reconcile_grace_period: Duration::from_secs(60),
        }
    }
}

impl ManagerConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the operation timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::InvalidValue(
                "operation_timeout must be non-zero (omit it to disable)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Memory cost in KiB.
    pub memory_cost_kib: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: argon2::Params::DEFAULT_M_COST,
            time_cost: argon2::Params::DEFAULT_T_COST,
            parallelism: argon2::Params::DEFAULT_P_COST,
        }
    }
}

impl HasherConfig {
    /// Builds Argon2 parameters from this configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if Argon2 rejects the costs.
    pub fn params(&self) -> Result<argon2::Params, ConfigError> {
        argon2::Params::new(
            self.memory_cost_kib,
            self.time_cost,
            self.parallelism,
            None,
        )
        .map_err(|e| ConfigError::InvalidValue(format!("argon2 parameters: {e}")))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if Argon2 rejects the costs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params().map(|_| ())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
