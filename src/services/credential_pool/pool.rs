//! Credential Pool Implementation
//!
//! This module provides the `CredentialPool` that holds the ordered Gemini
//! API keys and implements both selection policies over them.

use super::credential::Credential;
use super::strategy::{
    rotation_index, CounterMode, RotationCounter, SelectionPolicy, DEFAULT_BATCH_SIZE,
};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Configuration defects detected when building a pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("No API keys configured for the credential pool")]
    Empty,

    #[error("Rotation batch size must be > 0")]
    InvalidBatchSize,
}

// ============================================================================
// Pool Configuration
// ============================================================================

/// Configuration for credential pool behavior
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Selection policy
    pub policy: SelectionPolicy,
    /// Rotation counter consistency (rotating policy only)
    pub counter_mode: CounterMode,
    /// Calls served by each key before rotating (rotating policy only)
    pub batch_size: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            policy: SelectionPolicy::Rotating,
            counter_mode: CounterMode::Relaxed,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl PoolConfig {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn with_counter_mode(mut self, mode: CounterMode) -> Self {
        self.counter_mode = mode;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }
}

// ============================================================================
// Credential Pool
// ============================================================================

/// Ordered, read-only set of API keys plus the rotation counter
///
/// The counter is the only mutable state and is touched only by `next()`.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
    config: PoolConfig,
    rotation: RotationCounter,
}

impl CredentialPool {
    /// Create a pool from API keys in priority order
    pub fn new<I, S>(api_keys: I, config: PoolConfig) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let credentials: Vec<Credential> = api_keys
            .into_iter()
            .enumerate()
            .map(|(idx, key)| Credential::new(idx, key))
            .collect();

        if credentials.is_empty() {
            return Err(PoolError::Empty);
        }
        if config.batch_size == 0 {
            return Err(PoolError::InvalidBatchSize);
        }

        Ok(Self {
            rotation: RotationCounter::new(config.counter_mode),
            credentials,
            config,
        })
    }

    /// Create a pool with rotating selection and default batch size
    pub fn rotating<I, S>(api_keys: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(api_keys, PoolConfig::new(SelectionPolicy::Rotating))
    }

    /// Create a pool with sequential fallback selection
    pub fn fallback<I, S>(api_keys: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(api_keys, PoolConfig::new(SelectionPolicy::Fallback))
    }

    /// Select the credential for one rotating dispatch
    ///
    /// Returns `pool[floor(counter / batch_size) mod N]` and advances the
    /// counter by one whatever the outcome of the call that follows.
    pub fn next(&self) -> &Credential {
        let count = self.rotation.advance();
        let idx = rotation_index(count, self.config.batch_size, self.credentials.len());
        &self.credentials[idx]
    }

    /// All credentials in fallback order, starting at index 0
    pub fn sequence(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.config.policy
    }

    pub fn batch_size(&self) -> u64 {
        self.config.batch_size
    }

    /// Current value of the rotation counter
    pub fn calls_issued(&self) -> u64 {
        self.rotation.value()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false; an empty pool cannot be constructed
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.credentials.len(),
            policy: self.config.policy,
            counter_mode: self.rotation.mode(),
            calls_issued: self.rotation.value(),
        }
    }
}

// ============================================================================
// Pool Statistics
// ============================================================================

/// Log-safe summary of a credential pool
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Number of configured keys
    pub total: usize,
    /// Selection policy in use
    pub policy: SelectionPolicy,
    /// Rotation counter mode
    pub counter_mode: CounterMode,
    /// Rotation counter value
    pub calls_issued: u64,
}

// ============================================================================
// Tests
// ============================================================================
