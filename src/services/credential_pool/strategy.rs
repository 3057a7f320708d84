//! Credential selection strategies
//!
//! This module provides the two selection policies supported by the pool and
//! the shared rotation counter used by the rotating policy.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of consecutive calls served by one key before rotating to the next
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

// ============================================================================
// Selection Policy
// ============================================================================

/// How a dispatch picks credentials from the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// One credential per request, chosen by the shared call counter
    #[default]
    Rotating,
    /// Try every credential in order until one succeeds
    Fallback,
}

impl std::str::FromStr for SelectionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rotating" | "rotate" | "round_robin" | "roundrobin" => Ok(Self::Rotating),
            "fallback" | "failover" | "sequential" => Ok(Self::Fallback),
            _ => anyhow::bail!("Invalid key strategy: {}. Expected: rotating or fallback", s),
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rotating => write!(f, "rotating"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

// ============================================================================
// Counter Mode
// ============================================================================

/// Consistency of the rotation counter under concurrent selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// Separate load and store. Concurrent selections may observe the same
    /// value, so increments can be lost and a key can serve more calls than
    /// its batch.
    #[default]
    Relaxed,
    /// Single atomic fetch-add. Every selection gets a distinct counter value.
    Strict,
}

impl std::str::FromStr for CounterMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relaxed" => Ok(Self::Relaxed),
            "strict" => Ok(Self::Strict),
            _ => anyhow::bail!("Invalid counter mode: {}. Expected: relaxed or strict", s),
        }
    }
}

impl std::fmt::Display for CounterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Relaxed => write!(f, "relaxed"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

// ============================================================================
// Rotation Counter
// ============================================================================

/// Process-wide call counter for rotating selection
#[derive(Debug)]
pub struct RotationCounter {
    count: AtomicU64,
    mode: CounterMode,
}

impl RotationCounter {
    pub fn new(mode: CounterMode) -> Self {
        Self {
            count: AtomicU64::new(0),
            mode,
        }
    }

    /// Return the current count and advance it by one
    pub fn advance(&self) -> u64 {
        match self.mode {
            CounterMode::Relaxed => {
                let current = self.count.load(Ordering::Relaxed);
                self.count.store(current.wrapping_add(1), Ordering::Relaxed);
                current
            }
            CounterMode::Strict => self.count.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Current counter value
    pub fn value(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> CounterMode {
        self.mode
    }
}

/// Pool index served for a given counter value
///
/// `floor(count / batch_size) mod pool_len`. Both divisors must be non-zero,
/// which the pool guarantees at construction.
pub fn rotation_index(count: u64, batch_size: u64, pool_len: usize) -> usize {
    ((count / batch_size) % pool_len as u64) as usize
}

// ============================================================================
// Tests
// ============================================================================
