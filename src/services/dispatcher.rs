//! Generation dispatcher
//!
//! Turns one prompt into generated text by calling the provider with the
//! credentials the pool's policy allows:
//!
//! - **Rotating**: exactly one attempt with `pool.next()`; no retry.
//! - **Fallback**: keys 0..N-1 in order, stopping at the first success.
//!
//! Both policies run the same loop over an attempt plan; the rotating plan
//! simply has one entry. Every failed attempt is reported to an
//! [`AttemptObserver`] before the loop moves on.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::services::credential_pool::{Credential, CredentialPool, SelectionPolicy};
use crate::services::gemini::{GenerationProvider, ProviderError};

// ============================================================================
// Outcomes
// ============================================================================

/// Result of one provider call with one credential
#[derive(Debug)]
pub enum AttemptOutcome {
    Success { credential: usize, text: String },
    Failure { credential: usize, cause: ProviderError },
}

impl AttemptOutcome {
    pub fn credential(&self) -> usize {
        match self {
            Self::Success { credential, .. } | Self::Failure { credential, .. } => *credential,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Result of a whole dispatch
#[derive(Debug)]
pub enum DispatchResult {
    Success(String),
    /// Every attempt in the plan failed, in attempt order
    Exhausted(Vec<AttemptOutcome>),
}

/// Fold one attempt into the running dispatch
///
/// A success ends the dispatch with its text. A failure is appended to the
/// accumulated outcomes and the dispatch continues.
pub fn absorb(outcomes: &mut Vec<AttemptOutcome>, outcome: AttemptOutcome) -> ControlFlow<String> {
    match outcome {
        AttemptOutcome::Success { text, .. } => ControlFlow::Break(text),
        failure @ AttemptOutcome::Failure { .. } => {
            outcomes.push(failure);
            ControlFlow::Continue(())
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Sink for failed attempts
pub trait AttemptObserver: Send + Sync {
    fn attempt_failed(&self, credential: &Credential, cause: &ProviderError);
}

/// Reports failed attempts as structured warnings
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl AttemptObserver for TracingObserver {
    fn attempt_failed(&self, credential: &Credential, cause: &ProviderError) {
        tracing::warn!(
            credential = %credential.name(),
            credential_index = credential.index(),
            error = %cause,
            "Generation attempt failed"
        );
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Calls the generation provider under the pool's selection policy
pub struct GenerationDispatcher {
    pool: Arc<CredentialPool>,
    provider: Arc<dyn GenerationProvider>,
    observer: Arc<dyn AttemptObserver>,
    attempt_timeout: Option<Duration>,
}

impl GenerationDispatcher {
    pub fn new(pool: Arc<CredentialPool>, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            pool,
            provider,
            observer: Arc::new(TracingObserver),
            attempt_timeout: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bound each provider call; an expired attempt counts as a failure
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.pool.policy()
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Obtain generated text for a prompt
    pub async fn dispatch(&self, prompt: &str) -> DispatchResult {
        let start = Instant::now();
        let plan: &[Credential] = match self.pool.policy() {
            SelectionPolicy::Rotating => std::slice::from_ref(self.pool.next()),
            SelectionPolicy::Fallback => self.pool.sequence(),
        };

        let mut outcomes = Vec::with_capacity(plan.len());
        for credential in plan {
            let outcome = self.attempt(credential, prompt).await;
            if let AttemptOutcome::Failure { ref cause, .. } = outcome {
                self.observer.attempt_failed(credential, cause);
            }
            if let ControlFlow::Break(text) = absorb(&mut outcomes, outcome) {
                tracing::debug!(
                    credential = %credential.name(),
                    failed_attempts = outcomes.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Generation succeeded"
                );
                return DispatchResult::Success(text);
            }
        }

        tracing::error!(
            policy = %self.pool.policy(),
            attempts = outcomes.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "All generation attempts failed"
        );
        DispatchResult::Exhausted(outcomes)
    }

    async fn attempt(&self, credential: &Credential, prompt: &str) -> AttemptOutcome {
        let call = self.provider.generate(credential, prompt);
        let result = match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(limit)),
            },
            None => call.await,
        };

        match result {
            Ok(text) => AttemptOutcome::Success {
                credential: credential.index(),
                text,
            },
            Err(cause) => AttemptOutcome::Failure {
                credential: credential.index(),
                cause,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credential_pool::PoolConfig;
    use crate::test_support::{RecordingObserver, ScriptedProvider};

    fn dispatcher(
        policy: SelectionPolicy,
        keys: &[&str],
        provider: Arc<ScriptedProvider>,
        observer: Arc<RecordingObserver>,
    ) -> GenerationDispatcher {
        let pool = CredentialPool::new(keys.iter().copied(), PoolConfig::new(policy)).unwrap();
        GenerationDispatcher::new(Arc::new(pool), provider).with_observer(observer)
    }

    #[test]
    fn test_absorb_stops_on_success() {
        let mut outcomes = Vec::new();
        let flow = absorb(
            &mut outcomes,
            AttemptOutcome::Failure {
                credential: 0,
                cause: ProviderError::ParseError("bad".into()),
            },
        );
        assert_eq!(flow, ControlFlow::Continue(()));

        let flow = absorb(
            &mut outcomes,
            AttemptOutcome::Success {
                credential: 1,
                text: "ok".into(),
            },
        );
        assert_eq!(flow, ControlFlow::Break("ok".to_string()));
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].credential(), 0);
    }

    #[tokio::test]
    async fn test_fallback_reaches_last_key() {
        let provider = Arc::new(ScriptedProvider::new().succeed("k2", "quiz from k2"));
        let observer = Arc::new(RecordingObserver::default());
        let d = dispatcher(
            SelectionPolicy::Fallback,
            &["k0", "k1", "k2"],
            provider.clone(),
            observer.clone(),
        );

        match d.dispatch("prompt").await {
            DispatchResult::Success(text) => assert_eq!(text, "quiz from k2"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(provider.calls(), vec!["k0", "k1", "k2"]);
        assert_eq!(observer.failures(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_fallback_stops_at_first_success() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .succeed("k0", "first")
                .succeed("k1", "second"),
        );
        let observer = Arc::new(RecordingObserver::default());
        let d = dispatcher(
            SelectionPolicy::Fallback,
            &["k0", "k1", "k2"],
            provider.clone(),
            observer.clone(),
        );

        match d.dispatch("prompt").await {
            DispatchResult::Success(text) => assert_eq!(text, "first"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(provider.calls(), vec!["k0"]);
        assert!(observer.failures().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_exhaustion_records_every_key() {
        let provider = Arc::new(ScriptedProvider::new());
        let observer = Arc::new(RecordingObserver::default());
        let d = dispatcher(
            SelectionPolicy::Fallback,
            &["k0", "k1", "k2"],
            provider.clone(),
            observer.clone(),
        );

        match d.dispatch("prompt").await {
            DispatchResult::Exhausted(outcomes) => {
                assert_eq!(outcomes.len(), 3);
                assert!(outcomes.iter().all(AttemptOutcome::is_failure));
                let order: Vec<usize> = outcomes.iter().map(AttemptOutcome::credential).collect();
                assert_eq!(order, vec![0, 1, 2]);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(observer.failures(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_fallback_restarts_at_first_key() {
        let provider = Arc::new(ScriptedProvider::new().succeed("k1", "ok"));
        let observer = Arc::new(RecordingObserver::default());
        let d = dispatcher(
            SelectionPolicy::Fallback,
            &["k0", "k1"],
            provider.clone(),
            observer,
        );

        d.dispatch("a").await;
        d.dispatch("b").await;
        assert_eq!(provider.calls(), vec!["k0", "k1", "k0", "k1"]);
    }

    #[tokio::test]
    async fn test_rotating_makes_single_attempt() {
        let provider = Arc::new(ScriptedProvider::new().succeed("k1", "never reached"));
        let observer = Arc::new(RecordingObserver::default());
        let d = dispatcher(
            SelectionPolicy::Rotating,
            &["k0", "k1"],
            provider.clone(),
            observer.clone(),
        );

        match d.dispatch("prompt").await {
            DispatchResult::Exhausted(outcomes) => {
                assert_eq!(outcomes.len(), 1);
                assert_eq!(outcomes[0].credential(), 0);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(provider.calls(), vec!["k0"]);
        assert_eq!(observer.failures(), vec![0]);
        assert_eq!(d.pool().calls_issued(), 1);
    }

    #[tokio::test]
    async fn test_rotating_success() {
        let provider = Arc::new(ScriptedProvider::new().succeed("k0", "quiz"));
        let observer = Arc::new(RecordingObserver::default());
        let d = dispatcher(
            SelectionPolicy::Rotating,
            &["k0", "k1"],
            provider.clone(),
            observer,
        );

        for _ in 0..3 {
            match d.dispatch("prompt").await {
                DispatchResult::Success(text) => assert_eq!(text, "quiz"),
                other => panic!("expected success, got {:?}", other),
            }
        }
        assert_eq!(d.pool().calls_issued(), 3);
    }

    #[tokio::test]
    async fn test_attempt_timeout_becomes_failure() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .succeed("k0", "slow")
                .succeed("k1", "fast")
                .delay("k0", Duration::from_secs(5)),
        );
        let observer = Arc::new(RecordingObserver::default());
        let d = dispatcher(
            SelectionPolicy::Fallback,
            &["k0", "k1"],
            provider.clone(),
            observer.clone(),
        )
        .with_attempt_timeout(Some(Duration::from_millis(50)));

        match d.dispatch("prompt").await {
            DispatchResult::Success(text) => assert_eq!(text, "fast"),
            other => panic!("expected success, got {:?}", other),
        }
        assert_eq!(observer.failures(), vec![0]);
    }
}
