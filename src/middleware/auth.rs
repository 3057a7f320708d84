//! Authentication middleware
//!
//! Verifies the caller's Firebase ID token before any other work is done
//! for the request. On success the verified [`Principal`] is injected into
//! the request extensions; on failure the request is answered with a
//! generic 401 and the verification cause is only logged.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::services::identity::{IdentityVerifier, Principal};
use crate::utils::mask_secret;

/// Authentication state required by the middleware
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl AuthState {
    pub fn new(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { verifier }
    }
}

/// Middleware to require a verified identity token
///
/// This middleware:
/// 1. Extracts the token from the `Authorization` header
/// 2. Rejects with `No token provided` when there is none, without calling
///    the identity service
/// 3. Verifies the token once with the identity service
/// 4. Injects `Principal` into request extensions on success
///
/// # Errors
/// - 401 `{"error": "No token provided"}`: header missing or has no token
/// - 401 `{"error": "Unauthorized"}`: verification failed for any reason
pub async fn require_firebase_token(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_bearer_token(&request) else {
        tracing::warn!("Request missing identity token");
        return Err(ApiError::MissingToken);
    };

    match auth_state.verifier.verify(&token).await {
        Ok(principal) => {
            tracing::debug!(uid = %principal.uid, "Identity token verified");
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(e) => {
            tracing::warn!(
                token = %mask_secret(&token),
                error = %e,
                "Identity token verification failed"
            );
            Err(ApiError::InvalidToken)
        }
    }
}

/// Extract the identity token from the `Authorization` header
///
/// The token is the second space-separated segment of the header value
/// (`Bearer <token>`). A header without a non-empty second segment yields
/// `None`.
pub fn extract_bearer_token<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(' ').nth(1))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

/// Extract the verified principal from request extensions
pub fn get_principal<B>(request: &Request<B>) -> Option<&Principal> {
    request.extensions().get::<Principal>()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubVerifier, STUB_REJECTION_DETAIL};
    use axum::{http::StatusCode, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;

    fn request_with_auth(value: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn app(verifier: Arc<StubVerifier>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(principal): Extension<Principal>| async move { principal.uid }),
            )
            .layer(middleware::from_fn_with_state(
                AuthState::new(verifier),
                require_firebase_token,
            ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(
            extract_bearer_token(&request_with_auth(Some("Bearer abc.def"))),
            Some("abc.def".to_string())
        );
        assert_eq!(extract_bearer_token(&request_with_auth(None)), None);
        assert_eq!(extract_bearer_token(&request_with_auth(Some("Bearer"))), None);
        assert_eq!(extract_bearer_token(&request_with_auth(Some("Bearer "))), None);
        assert_eq!(extract_bearer_token(&request_with_auth(Some("abc.def"))), None);
    }

    #[tokio::test]
    async fn test_missing_token_skips_verification() {
        let verifier = Arc::new(StubVerifier::accepting("good"));
        let response = app(verifier.clone())
            .oneshot(request_with_auth(None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, r#"{"error":"No token provided"}"#);
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_token_hides_cause() {
        let verifier = Arc::new(StubVerifier::accepting("good"));
        let response = app(verifier.clone())
            .oneshot(request_with_auth(Some("Bearer expired")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_string(response).await;
        assert_eq!(body, r#"{"error":"Unauthorized"}"#);
        assert!(!body.contains(STUB_REJECTION_DETAIL));
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_valid_token_injects_principal() {
        let verifier = Arc::new(StubVerifier::accepting("good"));
        let response = app(verifier.clone())
            .oneshot(request_with_auth(Some("Bearer good")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "uid-123");
        assert_eq!(verifier.calls(), 1);
    }
}
