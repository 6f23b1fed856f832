//! trackvec-embedder library interface
//!
//! Audio embedding pipeline: a trigger names a track, its audio is fetched,
//! decoded to mono PCM, embedded by the model server and upserted into
//! SQLite keyed by track id.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod similarity;
pub mod utils;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, PipelineError};
pub use crate::workflow::PipelineOrchestrator;

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Pipeline shared by every request
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last pipeline failure, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>) -> Self {
        Self {
            orchestrator,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::webhook_routes())
        .merge(api::track_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
