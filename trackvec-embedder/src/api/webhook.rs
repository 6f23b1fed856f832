//! Webhook entry point
//!
//! POST /embeddings/generate: runs the pipeline for the track named in the
//! trigger payload and answers with the invocation result.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use crate::models::{FailureStatus, TriggerPayload};
use crate::AppState;

/// POST /embeddings/generate
///
/// 200 with a success status, 400 when the payload is unusable, 500 when a
/// pipeline stage failed. Always a JSON body.
pub async fn generate_embedding(
    State(state): State<AppState>,
    payload: Result<Json<TriggerPayload>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Unreadable trigger payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(FailureStatus::new(None, "InvalidPayload", rejection.body_text())),
            )
                .into_response();
        }
    };

    match state.orchestrator.process(&payload).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => {
            if err.stage().is_some() {
                state.record_error(err.to_string()).await;
            }
            err.into_response()
        }
    }
}

/// Build webhook routes
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/embeddings/generate", post(generate_embedding))
}
