//! Application state container
//!
//! This module defines the shared application state that is passed
//! to all request handlers via Axum's state extraction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Settings;
use crate::services::{
    CredentialPool, FirebaseConfig, FirebaseVerifier, GeminiConfig, GeminiProvider,
    GenerationDispatcher, IdentityVerifier, PoolConfig,
};

/// Shared application state
///
/// Cheap to clone; everything behind it is read-only except the pool's
/// rotation counter.
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Dispatcher owning the credential pool and the provider
    pub dispatcher: Arc<GenerationDispatcher>,

    /// Identity verifier used by the auth middleware
    pub verifier: Arc<dyn IdentityVerifier>,

    /// Application start time (for uptime calculation)
    pub start_time: Instant,
}

impl AppState {
    /// Build the production state from validated settings
    ///
    /// Fails when the key pool cannot be built, so a misconfigured process
    /// never starts serving.
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let gemini = &settings.gemini;

        tracing::debug!(key_count = gemini.api_keys.len(), "Creating credential pool");
        let pool_config = PoolConfig::new(gemini.strategy)
            .with_counter_mode(gemini.counter_mode)
            .with_batch_size(gemini.rotation_batch_size);
        let pool = CredentialPool::new(gemini.api_keys.iter().cloned(), pool_config)?;

        tracing::info!(
            key_count = pool.len(),
            policy = %pool.policy(),
            counter_mode = %gemini.counter_mode,
            batch_size = pool.batch_size(),
            "Initialized credential pool"
        );

        let mut provider_config = GeminiConfig::default()
            .with_model(gemini.model.clone())
            .with_timeout(gemini.timeout_seconds);
        if let Some(ref base_url) = gemini.base_url {
            provider_config = provider_config.with_base_url(base_url.clone());
        }
        let provider = GeminiProvider::new(provider_config)?;

        let dispatcher = GenerationDispatcher::new(Arc::new(pool), Arc::new(provider))
            .with_attempt_timeout(gemini.attempt_timeout_seconds.map(Duration::from_secs));

        let project_id = settings
            .firebase
            .project_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("Firebase project id missing"))?;
        let verifier = FirebaseVerifier::new(FirebaseConfig {
            jwks_url: settings.firebase.jwks_url.clone(),
            jwks_cache_secs: settings.firebase.jwks_cache_secs,
            ..FirebaseConfig::new(project_id)
        })?;

        tracing::info!("Application state initialized successfully");

        Ok(Self::from_parts(settings, Arc::new(dispatcher), Arc::new(verifier)))
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        settings: Settings,
        dispatcher: Arc<GenerationDispatcher>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            dispatcher,
            verifier,
            start_time: Instant::now(),
        }
    }

    /// Get the application uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CounterMode, SelectionPolicy};

    #[test]
    fn test_state_from_settings() {
        let mut settings = Settings::default();
        settings.gemini.api_keys = vec!["a".to_string(), "b".to_string()];
        settings.gemini.strategy = SelectionPolicy::Fallback;
        settings.gemini.counter_mode = CounterMode::Strict;
        settings.firebase.project_id = Some("quiz-test".to_string());

        let state = AppState::new(settings).unwrap();
        let stats = state.dispatcher.pool().stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.policy, SelectionPolicy::Fallback);
        assert_eq!(stats.counter_mode, CounterMode::Strict);
    }

    #[test]
    fn test_state_rejects_empty_pool() {
        let mut settings = Settings::default();
        settings.firebase.project_id = Some("quiz-test".to_string());

        assert!(AppState::new(settings).is_err());
    }
}
