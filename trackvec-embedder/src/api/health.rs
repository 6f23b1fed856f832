//! Health check endpoint
//!
//! Uptime, model identity and record count for monitoring.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the database cannot be queried
    pub status: String,
    /// Module name ("trackvec-embedder")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Git commit the binary was built from
    pub git_hash: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Embedding model served by the provider
    pub model: String,
    pub dimension: usize,
    pub sample_rate: u32,
    /// Stored embeddings (absent when the count query failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<i64>,
    /// Last error message if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let embeddings = match state.orchestrator.repository().count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not count embeddings");
            None
        }
    };

    let last_error = state.last_error.read().await.clone();
    let provider = state.orchestrator.provider();

    Json(HealthResponse {
        status: if embeddings.is_some() { "ok" } else { "degraded" }.to_string(),
        module: "trackvec-embedder".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        uptime_seconds,
        model: provider.model_id().to_string(),
        dimension: provider.dimension(),
        sample_rate: provider.sample_rate(),
        embeddings,
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
