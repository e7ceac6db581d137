// tests/api_http.rs
//
// HTTP-level tests for the read-only Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use common::{memory_store, snapshot, t};
use hotboard_collector::api::{self, ApiState};
use hotboard_collector::ingest::normalize::title_key;
use hotboard_collector::model::Source;

const BODY_LIMIT: usize = 1024 * 1024;

async fn test_router() -> Router {
    let store = memory_store().await;
    store
        .put(&snapshot(Source::Baidu, t(8, 0), &[("Topic A", 10.0), ("Topic B", 5.0)]))
        .await
        .unwrap();
    store
        .put(&snapshot(Source::Baidu, t(12, 0), &[("Topic B", 7.0), ("Topic A", 6.0)]))
        .await
        .unwrap();
    api::router(ApiState { store }, None)
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    (status, String::from_utf8(bytes.to_vec()).expect("utf8"))
}

#[tokio::test]
async fn health_returns_ok() {
    let (status, body) = get(test_router().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn latest_returns_newest_snapshot() {
    let (status, body) = get(test_router().await, "/api/sources/baidu/latest").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v["source"], "baidu");
    assert_eq!(v["items"][0]["title"], "Topic B");
    assert_eq!(v["items"][0]["rank"], 1);
    assert_eq!(v["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn latest_distinguishes_no_data_from_unknown_source() {
    let app = test_router().await;
    let (status, _) = get(app.clone(), "/api/sources/zhihu/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(app, "/api/sources/cailian/latest").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("cailian"));
}

#[tokio::test]
async fn history_filters_by_key_and_range() {
    let app = test_router().await;
    let key = title_key("Topic A");

    let (status, body) = get(app.clone(), &format!("/api/sources/baidu/history?key={key}")).await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_str(&body).unwrap();
    let ranks: Vec<u64> = v
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["rank"].as_u64().unwrap())
        .collect();
    assert_eq!(ranks, vec![1, 2]);

    let uri = format!(
        "/api/sources/baidu/history?key={key}&from=2025-11-07T09:00:00Z&to=2025-11-07T23:00:00Z"
    );
    let (_, body) = get(app.clone(), &uri).await;
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 1);
    assert_eq!(v[0]["heat"], 6.0);

    let (status, _) = get(app, "/api/sources/baidu/history").await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "key is required");
}

#[tokio::test]
async fn status_lists_sources_with_data() {
    let (status, body) = get(test_router().await, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    let v: Json = serde_json::from_str(&body).unwrap();
    assert_eq!(v.as_array().unwrap().len(), 1);
    assert_eq!(v[0]["source"], "baidu");
    assert_eq!(v[0]["item_count"], 2);
}
