//! Quiz generation endpoint
//!
//! POST /generate-quiz turns caller content into quiz text. The auth layer
//! has already verified the caller; this handler validates the payload,
//! builds the prompt and maps the dispatch result to a response.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::prompt::build_quiz_prompt;
use crate::error::ApiError;
use crate::middleware::TraceId;
use crate::server::state::AppState;
use crate::services::{AttemptOutcome, DispatchResult, Principal, SelectionPolicy};

/// Successful quiz generation body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizResponse {
    /// Raw text returned by the provider
    pub response: String,
}

/// POST /generate-quiz
pub async fn generate_quiz(
    State(state): State<AppState>,
    principal: Option<Extension<Principal>>,
    trace_id: Option<Extension<TraceId>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<QuizResponse>, ApiError> {
    let Some(Extension(principal)) = principal else {
        tracing::error!("Quiz route reached without a verified principal");
        return Err(ApiError::InvalidToken);
    };
    let trace_id = trace_id.map(|Extension(t)| t).unwrap_or_default();

    let content = if is_json_request(&headers) {
        extract_content(&body)
    } else {
        None
    };
    let Some(content) = content else {
        tracing::info!(trace_id = %trace_id, uid = %principal.uid, "Quiz request without content");
        return Err(ApiError::MissingContent);
    };

    tracing::info!(
        trace_id = %trace_id,
        uid = %principal.uid,
        content_chars = content.chars().count(),
        policy = %state.dispatcher.policy(),
        "Processing quiz request"
    );

    let prompt = build_quiz_prompt(&content);

    match state.dispatcher.dispatch(&prompt).await {
        DispatchResult::Success(text) => Ok(Json(QuizResponse { response: text })),
        DispatchResult::Exhausted(outcomes) => {
            for outcome in &outcomes {
                if let AttemptOutcome::Failure { credential, cause } = outcome {
                    tracing::error!(
                        trace_id = %trace_id,
                        credential_index = credential,
                        error = %cause,
                        "Quiz generation error"
                    );
                }
            }
            Err(match state.dispatcher.policy() {
                SelectionPolicy::Rotating => ApiError::GenerationFailed,
                SelectionPolicy::Fallback => ApiError::CredentialsExhausted,
            })
        }
    }
}

/// Whether the body is declared as `application/json`
///
/// Bodies of any other type are not parsed and count as empty.
pub fn is_json_request(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Pull usable content out of the request body
///
/// Returns `None` for an unparseable body, a missing `content` field, and
/// for `null`, `false`, `0` and `""`. Strings are returned verbatim; any
/// other JSON value is returned as its JSON text.
pub fn extract_content(body: &[u8]) -> Option<String> {
    let payload: Value = serde_json::from_slice(body).ok()?;
    match payload.get("content")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================
