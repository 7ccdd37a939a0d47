// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use conduit_core::application::engine::Engine;
use conduit_core::application::repository_factory::Repositories;
use conduit_core::domain::engine_config::EngineConfigManifest;
use conduit_core::infrastructure::agents::builtin_registry;
use conduit_core::presentation::api::app;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

fn router() -> Router {
    let engine = Engine::new(&EngineConfigManifest::default(), Repositories::in_memory(), builtin_registry()).unwrap();
    app(Arc::new(engine))
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_endpoint() {
    let router = router();
    let (status, body) = call(&router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["agent_types"], 3);
}

#[tokio::test]
async fn test_create_link_run_and_propagate() {
    let router = router();
    let user = Uuid::new_v4();

    let (status, beat) = call(
        &router,
        Method::POST,
        "/v1/agents",
        Some(json!({ "user_id": user, "name": "beat", "type": "heartbeat" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(beat["schedule"], "every_1h");
    let beat_id = beat["id"].as_str().unwrap().to_string();

    let (status, digest) = call(
        &router,
        Method::POST,
        "/v1/agents",
        Some(json!({ "user_id": user, "name": "digest", "type": "digest" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let digest_id = digest["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/links",
        Some(json!({ "source_id": beat_id, "receiver_id": digest_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, run) = call(
        &router,
        Method::POST,
        &format!("/v1/agents/{}/run", beat_id),
        Some(json!({ "kind": "check" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["emitted"].as_array().map(Vec::len), Some(1));

    let (status, report) = call(&router, Method::POST, "/v1/propagate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["events_delivered"], 1);

    let (status, health) = call(&router, Method::GET, &format!("/v1/agents/{}/health", digest_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["working"], true);

    // Nothing pending any more.
    let (status, body) = call(
        &router,
        Method::POST,
        &format!("/v1/agents/{}/run", digest_id),
        Some(json!({ "kind": "receive" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("no pending events"));
}

#[tokio::test]
async fn test_graph_errors_map_to_statuses() {
    let router = router();
    let user = Uuid::new_v4();
    let (_, relay) = call(
        &router,
        Method::POST,
        "/v1/agents",
        Some(json!({ "user_id": user, "name": "relay", "type": "relay" })),
    )
    .await;
    let relay_id = relay["id"].as_str().unwrap().to_string();

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/links",
        Some(json!({ "source_id": relay_id, "receiver_id": relay_id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(&router, Method::GET, &format!("/v1/agents/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &router,
        Method::POST,
        "/v1/agents",
        Some(json!({ "user_id": user, "name": "x", "type": "unknown" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_schedule_and_cleanup_triggers() {
    let router = router();
    let (status, report) = call(
        &router,
        Method::POST,
        "/v1/schedule/run",
        Some(json!({ "at": "2026-05-04T06:00:00Z" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["due"], 0);

    let (status, _) = call(&router, Method::POST, "/v1/schedule/run", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&router, Method::POST, "/v1/events/cleanup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);
}
