//! Track embedding queries
//!
//! GET /tracks/:track_id/embedding, GET /tracks/:track_id/similar

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::EmbeddingRecord;
use crate::similarity::{
    find_similar, SimilarTrack, DEFAULT_MATCH_COUNT, DEFAULT_THRESHOLD, MAX_MATCH_COUNT,
};
use crate::AppState;

/// GET /tracks/:track_id/similar query parameters
#[derive(Debug, Default, Deserialize)]
pub struct SimilarQuery {
    pub count: Option<usize>,
    pub threshold: Option<f32>,
}

/// GET /tracks/:track_id/similar response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarResponse {
    pub track_id: String,
    pub matches: Vec<SimilarTrack>,
}

/// GET /tracks/:track_id/embedding
pub async fn get_embedding(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
) -> ApiResult<Json<EmbeddingRecord>> {
    state
        .orchestrator
        .repository()
        .get(&track_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No embedding for track {}", track_id)))
}

/// GET /tracks/:track_id/similar
///
/// `count` defaults to 5 (max 100), `threshold` to 0.5.
pub async fn get_similar(
    State(state): State<AppState>,
    Path(track_id): Path<String>,
    Query(query): Query<SimilarQuery>,
) -> ApiResult<Json<SimilarResponse>> {
    let count = query.count.unwrap_or(DEFAULT_MATCH_COUNT);
    if count == 0 || count > MAX_MATCH_COUNT {
        return Err(ApiError::BadRequest(format!(
            "count must be between 1 and {}",
            MAX_MATCH_COUNT
        )));
    }

    let threshold = query.threshold.unwrap_or(DEFAULT_THRESHOLD);
    if !(-1.0..=1.0).contains(&threshold) {
        return Err(ApiError::BadRequest(
            "threshold must be between -1.0 and 1.0".to_string(),
        ));
    }

    let repository = state.orchestrator.repository();
    if !repository.exists(&track_id).await? {
        return Err(ApiError::NotFound(format!("No embedding for track {}", track_id)));
    }

    let matches = find_similar(repository, &track_id, count, threshold).await?;

    Ok(Json(SimilarResponse { track_id, matches }))
}

/// Build track query routes
pub fn track_routes() -> Router<AppState> {
    Router::new()
        .route("/tracks/:track_id/embedding", get(get_embedding))
        .route("/tracks/:track_id/similar", get(get_similar))
}
