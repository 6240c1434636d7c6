//! HTTP route tests driven through the router without a socket.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use relay_node::api::{create_router, AppState};
use relay_node::config::Config;
use relay_node::observability::REQUEST_ID_HEADER;
use serde_json::Value;
use tower::ServiceExt;

fn app() -> axum::Router {
    create_router(AppState::new(&Config::default()))
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_sum_of_path_numbers() {
    let app = app();

    let (status, body) = get(&app, "/sum/1/2/3/4/5").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["sum"], 15.0);

    let (status, body) = get(&app, "/sum/2.5/-1").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["sum"], 1.5);
}

#[tokio::test]
async fn test_sum_rejects_bad_input() {
    let app = app();

    let (status, body) = get(&app, "/sum/1/abc/3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["detail"], "Invalid number format in the URL path");

    let (status, body) = get(&app, "/sum/1e400").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["detail"], "Invalid number format in the URL path");

    let (status, body) = get(&app, "/sum").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["detail"], "No numbers provided");
}

#[tokio::test]
async fn test_stats_endpoint() {
    let app = app();

    let (status, body) = get(&app, "/api/realtime/stats").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["current_connections"], 0);
    let handlers: Vec<&str> = json["handlers"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(handlers, vec!["hello", "long_task", "ping", "welcome"]);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = app();

    get(&app, "/sum/1/2").await;
    let (status, body) = get(&app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("relay_http_requests"));
    assert!(body.contains("path=\"/sum/:numbers\""));
    assert!(body.contains("relay_websocket_connections"));
}

#[tokio::test]
async fn test_index_and_request_id() {
    let app = app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header(REQUEST_ID_HEADER, "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "req-42");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&body).contains("new WebSocket"));
}
