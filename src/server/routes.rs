//! Application routing
//!
//! This module defines all HTTP routes for the application.

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api::{health, quiz};
use crate::middleware::{
    auth::{require_firebase_token, AuthState},
    logging::{log_request, REQUEST_ID_HEADER, TRACE_ID_HEADER},
};
use crate::server::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Health check routes (no authentication required)
    let health_routes = Router::new().route("/health", get(health::health_check));

    // Quiz routes: token verification runs before the handler reads the body
    let auth_state = AuthState::new(state.verifier.clone());
    let quiz_routes = Router::new()
        .route("/generate-quiz", post(quiz::generate_quiz))
        .layer(middleware::from_fn_with_state(
            auth_state,
            require_firebase_token,
        ));

    Router::new()
        .merge(quiz_routes)
        .merge(health_routes)
        // Apply middleware layers (order matters: last added = outermost = runs first)
        .layer(create_cors_layer(&state.settings.cors_allowed_origin))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Create CORS layer restricted to the configured front-end origin
///
/// An origin that is not a valid header value allows no cross-origin
/// callers; `Settings::validate` rejects that case at startup.
fn create_cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = match HeaderValue::from_str(origin) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(origin = %origin, "Invalid CORS origin, cross-origin requests disabled");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            HeaderName::from_static(TRACE_ID_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}
