//! Health check endpoint
//!
//! Unauthenticated status endpoint for load balancers and uptime probes.
//! Reports pool size and policy but never key material.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::server::state::AppState;
use crate::services::{CounterMode, SelectionPolicy};

/// Response for the health check endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub uptime_seconds: u64,
    pub credentials: CredentialSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub count: usize,
    pub policy: SelectionPolicy,
    pub counter_mode: CounterMode,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.dispatcher.pool().stats();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.settings.app_version.clone(),
        environment: state.settings.environment.to_string(),
        uptime_seconds: state.uptime_seconds(),
        credentials: CredentialSummary {
            count: stats.total,
            policy: stats.policy,
            counter_mode: stats.counter_mode,
        },
    })
}
