//! Identity verification
//!
//! This module defines the `IdentityVerifier` seam used by the auth
//! middleware and its Firebase implementation. Firebase ID tokens are RS256
//! JWTs signed by `securetoken@system.gserviceaccount.com`; the public keys
//! are published as a JWK set and cached in memory.

use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Google's JWK set for Firebase ID token signing keys
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Allowed clock skew for time-based claims
const CLOCK_SKEW_SECS: i64 = 60;

/// Minimum gap between key set fetches forced by an unknown `kid`
pub const DEFAULT_MIN_KEY_REFRESH_SECS: u64 = 60;

// ============================================================================
// Principal
// ============================================================================

/// Verified identity of the caller
///
/// Injected into request extensions by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Firebase user id (`sub` claim)
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    /// e.g. "password", "google.com"
    pub sign_in_provider: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            email_verified: None,
            name: None,
            sign_in_provider: None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Why a token was not accepted
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Unsupported signing algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),

    #[error("Token header has no key id")]
    MissingKeyId,

    #[error("No signing key matches kid {0}")]
    UnknownKeyId(String),

    #[error("Token rejected: {0}")]
    Rejected(String),

    #[error("Invalid claims: {0}")]
    InvalidClaims(String),

    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(String),
}

// ============================================================================
// Verifier Trait
// ============================================================================

/// Verifies an identity token and derives the caller's principal
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError>;
}

// ============================================================================
// Firebase Verifier
// ============================================================================

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    iat: i64,
    #[serde(default)]
    auth_time: Option<i64>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<bool>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    firebase: Option<FirebaseInfo>,
}

#[derive(Debug, Deserialize)]
struct FirebaseInfo {
    #[serde(default)]
    sign_in_provider: Option<String>,
}

enum KeySource {
    Remote {
        client: reqwest::Client,
        url: String,
        cache: Cache<String, Arc<JwkSet>>,
        /// When the key set was last requested from Google
        last_fetch: Mutex<Option<Instant>>,
        min_refresh: Duration,
    },
    Static(Arc<JwkSet>),
}

/// Configuration for the Firebase verifier
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub jwks_url: String,
    /// How long fetched signing keys are reused
    pub jwks_cache_secs: u64,
    /// Unknown key ids trigger at most one refetch per this many seconds
    pub min_key_refresh_secs: u64,
}

impl FirebaseConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            jwks_url: FIREBASE_JWKS_URL.to_string(),
            jwks_cache_secs: 3600,
            min_key_refresh_secs: DEFAULT_MIN_KEY_REFRESH_SECS,
        }
    }
}

/// Verifies Firebase ID tokens for one project
pub struct FirebaseVerifier {
    project_id: String,
    issuer: String,
    keys: KeySource,
}

impl FirebaseVerifier {
    /// Verifier that fetches Google's signing keys on demand
    pub fn new(config: FirebaseConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let cache = Cache::builder()
            .max_capacity(4)
            .time_to_live(Duration::from_secs(config.jwks_cache_secs))
            .build();

        tracing::info!(
            project_id = %config.project_id,
            jwks_url = %config.jwks_url,
            "Initialized Firebase token verifier"
        );

        Ok(Self {
            issuer: format!("{}{}", FIREBASE_ISSUER_PREFIX, config.project_id),
            project_id: config.project_id,
            keys: KeySource::Remote {
                client,
                url: config.jwks_url,
                cache,
                last_fetch: Mutex::new(None),
                min_refresh: Duration::from_secs(config.min_key_refresh_secs),
            },
        })
    }

    /// Verifier with a fixed key set (local emulators and tests)
    pub fn with_static_keys(project_id: impl Into<String>, keys: JwkSet) -> Self {
        let project_id = project_id.into();
        Self {
            issuer: format!("{}{}", FIREBASE_ISSUER_PREFIX, project_id),
            project_id,
            keys: KeySource::Static(Arc::new(keys)),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn key_set(&self, refresh: bool) -> Result<Arc<JwkSet>, VerifyError> {
        match &self.keys {
            KeySource::Static(keys) => Ok(Arc::clone(keys)),
            KeySource::Remote {
                client,
                url,
                cache,
                last_fetch,
                ..
            } => {
                if refresh {
                    cache.invalidate(url).await;
                }
                cache
                    .try_get_with(url.clone(), async {
                        *lock(last_fetch) = Some(Instant::now());
                        fetch_key_set(client, url).await
                    })
                    .await
                    .map_err(|e| VerifyError::KeyFetch(e.to_string()))
            }
        }
    }

    /// Claim the right to refetch keys for an unknown `kid`
    ///
    /// The `kid` comes from an unverified header, so refetches are limited
    /// to one per `min_refresh` window across all requests.
    fn claim_refresh(&self) -> bool {
        let KeySource::Remote {
            last_fetch,
            min_refresh,
            ..
        } = &self.keys
        else {
            return false;
        };
        let mut last = lock(last_fetch);
        if last.is_some_and(|at| at.elapsed() < *min_refresh) {
            return false;
        }
        *last = Some(Instant::now());
        true
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        let mut keys = self.key_set(false).await?;
        if keys.find(kid).is_none() && self.claim_refresh() {
            // Google rotates keys; a new kid may mean our copy is stale
            tracing::debug!(kid = %kid, "Unknown key id, refreshing signing keys");
            keys = self.key_set(true).await?;
        }
        let jwk = keys
            .find(kid)
            .ok_or_else(|| VerifyError::UnknownKeyId(kid.to_string()))?;
        DecodingKey::from_jwk(jwk).map_err(|e| VerifyError::KeyFetch(e.to_string()))
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);
        validation.leeway = CLOCK_SKEW_SECS as u64;
        validation
    }
}

fn lock(last_fetch: &Mutex<Option<Instant>>) -> std::sync::MutexGuard<'_, Option<Instant>> {
    last_fetch.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn fetch_key_set(client: &reqwest::Client, url: &str) -> Result<Arc<JwkSet>, reqwest::Error> {
    tracing::debug!(url = %url, "Fetching Firebase signing keys");
    let keys: JwkSet = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    tracing::info!(key_count = keys.keys.len(), "Fetched Firebase signing keys");
    Ok(Arc::new(keys))
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, VerifyError> {
        let header = decode_header(token).map_err(|e| VerifyError::Malformed(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::UnsupportedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;

        let key = self.decoding_key(&kid).await?;
        let data = decode::<FirebaseClaims>(token, &key, &self.validation())
            .map_err(|e| VerifyError::Rejected(e.to_string()))?;
        let claims = data.claims;

        if claims.sub.is_empty() {
            return Err(VerifyError::InvalidClaims("empty sub".to_string()));
        }
        let now = chrono::Utc::now().timestamp();
        if claims.iat > now + CLOCK_SKEW_SECS {
            return Err(VerifyError::InvalidClaims("iat is in the future".to_string()));
        }
        if claims.auth_time.is_some_and(|t| t > now + CLOCK_SKEW_SECS) {
            return Err(VerifyError::InvalidClaims("auth_time is in the future".to_string()));
        }

        Ok(Principal {
            uid: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified,
            name: claims.name,
            sign_in_provider: claims.firebase.and_then(|f| f.sign_in_provider),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
