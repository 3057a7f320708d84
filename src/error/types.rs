//! API error types
//!
//! Every error surfaced to a client is one of these variants, rendered as a
//! flat `{ "error": "<message>" }` body. Detailed causes are logged where the
//! error is produced and never carried into the response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    #[error("No token provided")]
    MissingToken,

    #[error("Unauthorized")]
    InvalidToken,

    #[error("Content required")]
    MissingContent,

    /// The single rotating attempt failed
    #[error("Failed to generate quiz")]
    GenerationFailed,

    /// Every key in the fallback sequence failed
    #[error("Failed to generate quiz with all API keys")]
    CredentialsExhausted,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingToken | ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::MissingContent => StatusCode::BAD_REQUEST,
            ApiError::GenerationFailed | ApiError::CredentialsExhausted => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

/// Error body returned for every failed request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}
