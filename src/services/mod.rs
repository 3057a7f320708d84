//! Services module
//!
//! Contains the credential pool, generation dispatch and the external
//! provider and identity integrations.

pub mod credential_pool;
pub mod dispatcher;
pub mod gemini;
pub mod identity;

pub use credential_pool::{
    CounterMode, Credential, CredentialPool, PoolConfig, PoolError, PoolStats, SelectionPolicy,
};
pub use dispatcher::{
    AttemptObserver, AttemptOutcome, DispatchResult, GenerationDispatcher, TracingObserver,
};
pub use gemini::{GeminiConfig, GeminiProvider, GenerationProvider, ProviderError};
pub use identity::{FirebaseConfig, FirebaseVerifier, IdentityVerifier, Principal, VerifyError};
