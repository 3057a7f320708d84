//! Gemini service for Google Gemini API interactions
//!
//! This module defines the `GenerationProvider` seam used by the dispatcher
//! and its REST implementation against the Gemini `generateContent` API.
//! Key selection is not done here; the caller passes the credential.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::schemas::gemini::{GeminiError, GeminiRequest, GeminiResponse, DEFAULT_MODEL};
use crate::services::credential_pool::Credential;
use crate::utils::clip;

// ============================================================================
// Constants
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Longest provider error body kept in a failure cause
const MAX_ERROR_BODY_CHARS: usize = 500;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when calling a generation provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Attempt timed out after {0:?}")]
    Timeout(Duration),
}

// ============================================================================
// Provider Trait
// ============================================================================

/// A stateless text generation backend
///
/// One call is one request/response exchange authenticated with the given
/// credential.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, credential: &Credential, prompt: &str) -> Result<String, ProviderError>;
}

// ============================================================================
// Gemini Provider
// ============================================================================

/// Configuration for the Gemini provider
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Model name (default: gemini-2.5-flash)
    pub model: String,

    /// Base URL (default: generativelanguage.googleapis.com)
    pub base_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            timeout_seconds: 120,
        }
    }
}

impl GeminiConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }
}

/// REST client for the Gemini generateContent API
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    model: String,
    base_url: Option<String>,
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        tracing::info!(
            model = %config.model,
            base_url = %config.base_url.as_deref().unwrap_or(GEMINI_API_BASE),
            timeout_seconds = config.timeout_seconds,
            "Initialized Gemini provider"
        );

        Ok(Self {
            client,
            model: config.model,
            base_url: config.base_url,
        })
    }

    fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(GEMINI_API_BASE)
            .trim_end_matches('/')
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url(), self.model)
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    async fn generate(&self, credential: &Credential, prompt: &str) -> Result<String, ProviderError> {
        let url = self.endpoint();

        tracing::debug!(
            model = %self.model,
            url = %url,
            credential = %credential.name(),
            prompt_chars = prompt.chars().count(),
            "Calling Gemini generateContent API"
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", credential.api_key())
            .header("Content-Type", "application/json")
            .json(&GeminiRequest::from_prompt(prompt))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            if let Ok(gemini_error) = serde_json::from_str::<GeminiError>(&body) {
                return Err(ProviderError::ApiError {
                    code: gemini_error.error.code,
                    message: gemini_error.error.message,
                });
            }
            return Err(ProviderError::ApiError {
                code: status.as_u16() as i32,
                message: clip(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Gemini response");
            ProviderError::ParseError(e.to_string())
        })?;

        if let Some(usage) = parsed.usage_metadata.as_ref() {
            tracing::debug!(
                credential = %credential.name(),
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini usage"
            );
        }

        Ok(parsed.text().unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubHttpServer;

    #[test]
    fn test_gemini_config_defaults() {
        let config = GeminiConfig::default();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.timeout_seconds, 120);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_gemini_endpoint() {
        let provider = GeminiProvider::new(
            GeminiConfig::default()
                .with_model("gemini-2.0-flash")
                .with_base_url("http://localhost:9000/v1beta/"),
        )
        .expect("Should create provider");

        assert_eq!(
            provider.endpoint(),
            "http://localhost:9000/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_default_endpoint() {
        let provider = GeminiProvider::new(GeminiConfig::default()).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    fn provider_for(server: &StubHttpServer) -> GeminiProvider {
        GeminiProvider::new(
            GeminiConfig::default()
                .with_base_url(server.url("/v1beta"))
                .with_timeout(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = StubHttpServer::start(
            200,
            r#"{"candidates":[{"content":{"role":"model","parts":[
                {"text":"planning","thought":true},
                {"text":"''What is ATP?''\n"},
                {"text":"--Energy--"}
            ]},"finishReason":"STOP"}],
            "usageMetadata":{"promptTokenCount":12,"candidatesTokenCount":8}}"#,
        )
        .await;
        let cred = Credential::new(1, "secret-key-1");

        let text = provider_for(&server)
            .generate(&cred, "Photosynthesis")
            .await
            .unwrap();
        assert_eq!(text, "''What is ATP?''\n--Energy--");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let raw = requests[0].to_ascii_lowercase();
        assert!(raw.starts_with("post /v1beta/models/gemini-2.5-flash:generatecontent "));
        assert!(raw.contains("x-goog-api-key: secret-key-1\r\n"));
        assert!(requests[0].contains(r#""text":"Photosynthesis""#));
        assert!(!raw.contains("key=secret-key-1"));
    }

    #[tokio::test]
    async fn test_generate_without_candidates_is_empty_text() {
        let server = StubHttpServer::start(200, r#"{"candidates":[]}"#).await;
        let cred = Credential::new(0, "key");

        let text = provider_for(&server).generate(&cred, "prompt").await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_generate_maps_gemini_error_body() {
        let server = StubHttpServer::start(
            429,
            r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .await;
        let cred = Credential::new(0, "key");

        let err = provider_for(&server).generate(&cred, "prompt").await.unwrap_err();
        match err {
            ProviderError::ApiError { code, message } => {
                assert_eq!(code, 429);
                assert_eq!(message, "Resource has been exhausted");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_maps_unstructured_error_body() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS + 50);
        let server = StubHttpServer::start(503, body).await;
        let cred = Credential::new(0, "key");

        let err = provider_for(&server).generate(&cred, "prompt").await.unwrap_err();
        match err {
            ProviderError::ApiError { code, message } => {
                assert_eq!(code, 503);
                assert_eq!(message.chars().count(), MAX_ERROR_BODY_CHARS + 3);
                assert!(message.ends_with("..."));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_unparseable_success_body() {
        let server = StubHttpServer::start(200, "not json").await;
        let cred = Credential::new(0, "key");

        let err = provider_for(&server).generate(&cred, "prompt").await.unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let provider = GeminiProvider::new(
            GeminiConfig::default()
                .with_base_url("http://127.0.0.1:1")
                .with_timeout(2),
        )
        .unwrap();
        let cred = Credential::new(0, "key");

        let err = provider.generate(&cred, "prompt").await.unwrap_err();
        assert!(matches!(err, ProviderError::HttpError(_)));
    }
}
