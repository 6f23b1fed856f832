//! HTTP API integration tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`.

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use trackvec_embedder::models::EmbeddingVector;
use trackvec_embedder::{build_router, AppState};

async fn create_test_app() -> (axum::Router, TestPipeline) {
    let pipeline = create_test_pipeline().await;
    let app = build_router(AppState::new(pipeline.orchestrator.clone()));
    (app, pipeline)
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn trigger(track_id: &str, audio_path: &str) -> String {
    json!({
        "type": "INSERT",
        "table": "tracks",
        "record": { "id": track_id, "mainAudioFilePath": audio_path, "title": "Song" },
        "old_record": null
    })
    .to_string()
}

#[tokio::test]
async fn test_webhook_success() {
    let (app, pipeline) = create_test_app().await;
    pipeline.store.put("tracks/a.wav", short_tone());

    let (status, body) = send(&app, post_json("/embeddings/generate", trigger("t-1", "tracks/a.wav"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["trackId"], "t-1");
    assert_eq!(body["outcome"], "created");
    assert_eq!(body["dimension"], TEST_DIMENSION);

    let (status, body) = send(&app, post_json("/embeddings/generate", trigger("t-1", "tracks/a.wav"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "updated");
    assert_eq!(body["revision"], 2);
}

#[tokio::test]
async fn test_webhook_missing_field_is_400() {
    let (app, pipeline) = create_test_app().await;

    let (status, body) = send(
        &app,
        post_json("/embeddings/generate", json!({ "record": { "id": "t-1" } }).to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["kind"], "MissingField");
    assert!(body["stage"].is_null());
    assert!(body["message"].as_str().unwrap().contains("mainAudioFilePath"));
    assert_eq!(pipeline.store.calls(), 0);
}

#[tokio::test]
async fn test_webhook_unreadable_body_is_400() {
    let (app, _pipeline) = create_test_app().await;

    let (status, body) = send(&app, post_json("/embeddings/generate", "{not json".to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "InvalidPayload");
}

#[tokio::test]
async fn test_webhook_stage_failure_is_500_and_reported_in_health() {
    let (app, _pipeline) = create_test_app().await;

    let (status, body) = send(&app, post_json("/embeddings/generate", trigger("t-1", "tracks/missing.wav"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["stage"], "fetch");
    assert_eq!(body["kind"], "RetrievalError");

    let (status, health) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(health["last_error"].as_str().unwrap().contains("tracks/missing.wav"));
    assert_eq!(health["embeddings"], 0);
}

#[tokio::test]
async fn test_webhook_persist_failure_is_500() {
    let (app, pipeline) = create_test_app().await;
    pipeline.store.put("tracks/a.wav", short_tone());
    pipeline.repository.pool().close().await;

    let (status, body) = send(&app, post_json("/embeddings/generate", trigger("t-1", "tracks/a.wav"))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["stage"], "persist");
    assert_eq!(body["kind"], "PersistenceError");
}

#[tokio::test]
async fn test_get_embedding() {
    let (app, pipeline) = create_test_app().await;
    pipeline
        .repository
        .upsert("t-1", &EmbeddingVector::new(vec![0.25; TEST_DIMENSION]))
        .await
        .unwrap();

    let (status, body) = send(&app, get("/tracks/t-1/embedding")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trackId"], "t-1");
    assert_eq!(body["embedding"].as_array().unwrap().len(), TEST_DIMENSION);
    assert_eq!(body["revision"], 1);

    let (status, body) = send(&app, get("/tracks/nope/embedding")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_similar_tracks() {
    let (app, pipeline) = create_test_app().await;
    let unit = |i: usize| {
        let mut values = vec![0.0; TEST_DIMENSION];
        values[i] = 1.0;
        values
    };
    let mut near = unit(0);
    near[1] = 0.2;
    let mut nearer = unit(0);
    nearer[1] = 0.1;

    for (id, values) in [
        ("src", unit(0)),
        ("near", near),
        ("nearer", nearer),
        ("unrelated", unit(2)),
    ] {
        pipeline
            .repository
            .upsert(id, &EmbeddingVector::new(values))
            .await
            .unwrap();
    }

    let (status, body) = send(&app, get("/tracks/src/similar")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trackId"], "src");
    let ids: Vec<&str> = body["matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["trackId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["nearer", "near"]);

    let (_, body) = send(&app, get("/tracks/src/similar?count=1")).await;
    assert_eq!(body["matches"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, get("/tracks/src/similar?threshold=-1")).await;
    assert_eq!(body["matches"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_similar_validation() {
    let (app, pipeline) = create_test_app().await;
    pipeline
        .repository
        .upsert("src", &EmbeddingVector::new(vec![1.0; TEST_DIMENSION]))
        .await
        .unwrap();

    let (status, _) = send(&app, get("/tracks/src/similar?count=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/tracks/src/similar?count=101")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/tracks/src/similar?threshold=1.5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(&app, get("/tracks/nope/similar")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _pipeline) = create_test_app().await;

    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "trackvec-embedder");
    assert_eq!(body["model"], "fake-model");
    assert_eq!(body["dimension"], TEST_DIMENSION);
    assert_eq!(body["sample_rate"], TEST_SAMPLE_RATE);
    assert!(body.get("last_error").is_none());
}
