//! Error types for trackvec-embedder
//!
//! One enum per pipeline stage, aggregated by [`PipelineError`]. The
//! orchestrator tags every failure with the stage it came from; the HTTP
//! layer renders it as a structured failure status.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::models::{FailureStatus, Stage};

/// Object store retrieval failure
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("audio object not found: {0}")]
    NotFound(String),

    #[error("access denied for {path}: {reason}")]
    AccessDenied { path: String, reason: String },

    #[error("transfer interrupted for {path}: {reason}")]
    Interrupted { path: String, reason: String },

    #[error("object store returned HTTP {status} for {path}")]
    Upstream { status: u16, path: String },

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl RetrievalError {
    /// Whether a retry might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::Interrupted { .. } | RetrievalError::Timeout(_) => true,
            RetrievalError::Upstream { status, .. } => *status >= 500 || *status == 429,
            RetrievalError::NotFound(_)
            | RetrievalError::AccessDenied { .. }
            | RetrievalError::InvalidPath(_) => false,
        }
    }
}

/// Audio decoding failure (never retried)
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed audio: {0}")]
    Malformed(String),

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("audio contains no samples")]
    Empty,

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("decoding timed out after {0:?}")]
    Timeout(Duration),

    /// Abandoned by the caller before completion
    #[error("decoding cancelled")]
    Cancelled,
}

/// Embedding capability failure (never retried)
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("audio signal is empty")]
    EmptySignal,

    #[error("signal sample rate {actual} Hz does not match required {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding contains non-finite values")]
    NonFinite,

    #[error("embedding capability failed: {0}")]
    Capability(String),

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
}

/// Datastore failure
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("embedding has dimension {actual}, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding contains non-finite values")]
    NonFinite,

    #[error("stored embedding for {track_id} is unreadable: {reason}")]
    CorruptRecord { track_id: String, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("persist timed out after {0:?}")]
    Timeout(Duration),
}

impl PersistenceError {
    /// Whether a retry might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            PersistenceError::Timeout(_) => true,
            PersistenceError::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db_err) => {
                    let message = db_err.message();
                    message.contains("database is locked") || message.contains("busy")
                }
                _ => false,
            },
            _ => false,
        }
    }
}

/// Embedding capability could not be brought up at process start
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("embedding server unreachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("embedding server returned an invalid description: {0}")]
    BadResponse(String),

    #[error("embedding server runs model {actual}, expected {expected}")]
    ModelMismatch { expected: String, actual: String },

    #[error("embedding server produces dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding server consumes {actual} Hz, expected {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },
}

/// Pipeline failure, tagged by stage
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Client input defect; raised before any I/O
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl PipelineError {
    /// Stage that failed; `None` for input validation
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::MissingField(_) => None,
            PipelineError::Retrieval(_) => Some(Stage::Fetch),
            PipelineError::Decode(_) => Some(Stage::Decode),
            PipelineError::Inference(_) => Some(Stage::Embed),
            PipelineError::Persistence(_) => Some(Stage::Persist),
        }
    }

    /// Taxonomy name reported to callers
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MissingField(_) => "MissingField",
            PipelineError::Retrieval(_) => "RetrievalError",
            PipelineError::Decode(_) => "DecodeError",
            PipelineError::Inference(_) => "InferenceError",
            PipelineError::Persistence(_) => "PersistenceError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::MissingField(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_failure_status(&self) -> FailureStatus {
        FailureStatus::new(self.stage(), self.kind(), self.to_string())
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_failure_status())).into_response()
    }
}

/// API error type for the non-pipeline endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Datastore error
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Persistence(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
