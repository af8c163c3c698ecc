// ABOUTME: Integration tests for the REST surface
// ABOUTME: Exercises room create/lookup, one-shot execution, and health through the router

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use pairroom_api::{create_router, AppState};
use pairroom_rooms::RoomEvent;
use pairroom_storage::SqliteRoomStore;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup() -> (Router, AppState) {
    let store = Arc::new(SqliteRoomStore::connect("sqlite::memory:").await.unwrap());
    let state = common::state_with(store);
    (create_router(state.clone()), state)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = setup().await;
    let (status, json) = call(&app, Method::GET, "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "pairroom");
    assert_eq!(json["activeRooms"], 0);
    assert!(json["version"].is_string());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_create_then_get_room() {
    let (app, _) = setup().await;

    let (status, created) = call(&app, Method::POST, "/api/rooms", None).await;
    assert_eq!(status, StatusCode::CREATED);
    let room_id = created["roomId"].as_str().unwrap().to_string();
    assert_eq!(room_id.len(), 8);
    assert!(created["message"].is_string());

    let (status, room) = call(&app, Method::GET, &format!("/api/rooms/{}", room_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["roomId"], room_id.as_str());
    assert_eq!(room["language"], "python");
    assert_eq!(room["code"], "# Welcome! Start coding here...\n");
    assert_eq!(room["version"], 0);
    assert_eq!(room["activeUsers"], 0);
}

#[tokio::test]
async fn test_create_room_with_language() {
    let (app, _) = setup().await;

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/rooms",
        Some(json!({ "language": "javascript" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/api/rooms/{}", created["roomId"].as_str().unwrap());
    let (_, room) = call(&app, Method::GET, &uri, None).await;
    assert_eq!(room["language"], "javascript");
}

#[tokio::test]
async fn test_create_room_rejects_bad_body() {
    let (app, _) = setup().await;
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/rooms")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_room_is_not_found() {
    let (app, _) = setup().await;
    let (status, json) = call(&app, Method::GET, "/api/rooms/nosuchroom", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_room_id_rejected() {
    let (app, _) = setup().await;
    let (status, json) = call(&app, Method::GET, "/api/rooms/bad%20id", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_live_room_reports_in_memory_state() {
    let (app, state) = setup().await;
    let (outbox, _inbox) = pairroom_rooms::outbox();
    let handle = state.rooms.join("liveroom", "conn-1".to_string(), outbox);
    handle.submit(RoomEvent::Edit {
        connection_id: "conn-1".to_string(),
        content: "x = 42".to_string(),
    });

    let (status, room) = call(&app, Method::GET, "/api/rooms/liveroom", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(room["code"], "x = 42");
    assert_eq!(room["version"], 1);
    assert_eq!(room["activeUsers"], 1);

    let (_, health) = call(&app, Method::GET, "/api/health", None).await;
    assert_eq!(health["activeRooms"], 1);
}

#[tokio::test]
async fn test_execute_endpoint() {
    let (app, _) = setup().await;
    let (status, json) = call(
        &app,
        Method::POST,
        "/api/execute",
        Some(json!({ "code": "print(1)", "language": "python" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["stdout"], "print(1)\n");
    assert_eq!(json["timed_out"], false);
}

#[tokio::test]
async fn test_execute_defaults_to_python() {
    let (app, _) = setup().await;
    let (status, json) = call(
        &app,
        Method::POST,
        "/api/execute",
        Some(json!({ "code": "1 + 1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
}

#[tokio::test]
async fn test_execute_unsupported_language() {
    let (app, _) = setup().await;
    let (status, json) = call(
        &app,
        Method::POST,
        "/api/execute",
        Some(json!({ "code": "console.log(1)", "language": "javascript" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "UNSUPPORTED_LANGUAGE");
}

#[tokio::test]
async fn test_websocket_route_requires_upgrade() {
    let (app, _) = setup().await;
    let (status, _) = call(&app, Method::GET, "/ws/room1", None).await;
    assert!(status.is_client_error(), "got {}", status);
}
