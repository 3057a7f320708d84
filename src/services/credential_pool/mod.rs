//! Credential Pool Module
//!
//! Holds the ordered Gemini API keys and the two ways of picking them:
//!
//! - **Rotating**: each request commits to one key. The key changes every
//!   `batch_size` calls (`floor(counter / batch_size) mod N`).
//! - **Fallback**: each request walks the keys in order until one succeeds.
//!
//! # Example
//! ```ignore
//! use quiz_gateway::services::credential_pool::{CredentialPool, PoolConfig, SelectionPolicy};
//!
//! let pool = CredentialPool::new(vec!["key1", "key2"], PoolConfig::new(SelectionPolicy::Rotating))?;
//! let cred = pool.next();
//! println!("Using credential: {}", cred.name());
//! ```

mod credential;
mod pool;
mod strategy;

pub use credential::Credential;
pub use pool::{CredentialPool, PoolConfig, PoolError, PoolStats};
pub use strategy::{rotation_index, CounterMode, RotationCounter, SelectionPolicy, DEFAULT_BATCH_SIZE};
