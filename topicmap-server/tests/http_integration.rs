//! HTTP integration tests for the topicmap REST API
//!
//! Full handler dispatch through the Axum router via `oneshot`, backed by an
//! in-memory or file graph store.

use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use topicmap_core::{FileGraphStore, GraphStore, MemoryGraphStore, TopicMapConfig};
use topicmap_server::http::build_router;
use topicmap_server::router::AppState;

// For oneshot testing
use axum::body::Body;
use axum::http::Request;
use tower::ServiceExt;

fn test_config() -> TopicMapConfig {
    TopicMapConfig::from_toml(
        r#"
        [service]
        socket_path = "/tmp/topicmap-http-test.sock"
        log_level = "info"

        [store]
        backend = "memory"
        "#,
    )
    .unwrap()
}

fn make_http_state() -> Arc<AppState> {
    Arc::new(AppState::new(test_config(), Arc::new(MemoryGraphStore::new())))
}

async fn send(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let app = build_router(state.clone());

    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            req = req.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn node(label: &str, embedding: &[f32]) -> serde_json::Value {
    json!({ "label": label, "embedding": embedding, "sessionId": format!("s-{}", label) })
}

// ===========================================================================
// TEST 1: GET /health — responds 200 with store fields
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint() {
    let state = make_http_state();

    let (status, body) = send(&state, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["nodes"], 0);
    assert!(body["version"].is_string(), "version must be present");
    assert!(body["socket"].is_string(), "socket path must be present");
}

// ===========================================================================
// TEST 2: GET /version — returns version and protocol
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let (status, body) = send(&make_http_state(), "GET", "/version", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
    assert_eq!(body["protocol"], "topicmap/1");
}

// ===========================================================================
// TEST 3: POST /nodes then GET /nodes/:id
// ===========================================================================
#[tokio::test]
async fn test_add_and_fetch_node() {
    let state = make_http_state();

    let (status, created) = send(&state, "POST", "/nodes", Some(node("Logarithms", &[1.0, 0.0]))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["node"]["messageCount"], 1);
    assert!(created["links"].as_array().unwrap().is_empty());
    let id = created["node"]["id"].as_str().unwrap().to_string();

    let (status, fetched) = send(&state, "GET", &format!("/nodes/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["label"], "Logarithms");
    assert_eq!(fetched["sessionId"], "s-Logarithms");
}

// ===========================================================================
// TEST 4: similar nodes are linked and reported as neighbors
// ===========================================================================
#[tokio::test]
async fn test_neighbors_endpoint() {
    let state = make_http_state();
    let (_, a) = send(&state, "POST", "/nodes", Some(node("A", &[1.0, 0.0]))).await;
    let (_, b) = send(&state, "POST", "/nodes", Some(node("B", &[1.0, 0.0]))).await;
    send(&state, "POST", "/nodes", Some(node("C", &[0.0, 1.0]))).await;

    assert_eq!(b["links"][0]["similarity"], 1.0);
    let a_id = a["node"]["id"].as_str().unwrap();
    let (status, body) = send(&state, "GET", &format!("/nodes/{}/neighbors", a_id), None).await;

    assert_eq!(status, StatusCode::OK);
    let neighbors = body["neighbors"].as_array().unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0]["node"]["label"], "B");
}

// ===========================================================================
// TEST 5: DELETE /nodes/:id cascades links
// ===========================================================================
#[tokio::test]
async fn test_delete_node_cascades() {
    let state = make_http_state();
    let (_, a) = send(&state, "POST", "/nodes", Some(node("A", &[1.0, 0.0]))).await;
    send(&state, "POST", "/nodes", Some(node("B", &[1.0, 0.0]))).await;
    let a_id = a["node"]["id"].as_str().unwrap();

    let (status, body) = send(&state, "DELETE", &format!("/nodes/{}", a_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (_, graph) = send(&state, "GET", "/graph", None).await;
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 1);
    assert!(graph["links"].as_array().unwrap().is_empty());

    // Second delete is a no-op
    let (status, body) = send(&state, "DELETE", &format!("/nodes/{}", a_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], false);
}

// ===========================================================================
// TEST 6: error status mapping
// ===========================================================================
#[tokio::test]
async fn test_error_statuses() {
    let state = make_http_state();
    send(&state, "POST", "/nodes", Some(node("A", &[1.0, 0.0]))).await;

    let (mismatch, body) = send(&state, "POST", "/nodes", Some(node("B", &[1.0, 0.0, 0.0]))).await;
    assert_eq!(mismatch, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "invalid");

    let (missing, _) = send(
        &state,
        "GET",
        "/nodes/00000000-0000-4000-8000-000000000000",
        None,
    )
    .await;
    assert_eq!(missing, StatusCode::NOT_FOUND);

    let (bad_id, _) = send(&state, "GET", "/nodes/not-a-uuid", None).await;
    assert_eq!(bad_id, StatusCode::BAD_REQUEST);

    let (no_ingest, _) = send(
        &state,
        "POST",
        "/sessions",
        Some(json!({ "sessionId": "s-1", "turns": [] })),
    )
    .await;
    assert_eq!(no_ingest, StatusCode::SERVICE_UNAVAILABLE);
}

// ===========================================================================
// TEST 7: DELETE /graph twice leaves an empty graph
// ===========================================================================
#[tokio::test]
async fn test_clear_graph_is_idempotent() {
    let state = make_http_state();
    send(&state, "POST", "/nodes", Some(node("A", &[1.0, 0.0]))).await;

    let (first, _) = send(&state, "DELETE", "/graph", None).await;
    let (second, _) = send(&state, "DELETE", "/graph", None).await;
    let (_, graph) = send(&state, "GET", "/graph", None).await;
    let (_, list) = send(&state, "GET", "/nodes", None).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert!(graph["nodes"].as_array().unwrap().is_empty());
    assert_eq!(list["count"], 0);
}

// ===========================================================================
// TEST 8: file store survives a server restart
// ===========================================================================
#[tokio::test]
async fn test_file_store_persists_across_states() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");

    let first: Arc<dyn GraphStore> = Arc::new(FileGraphStore::open(&path).await.unwrap());
    let state = Arc::new(AppState::new(test_config(), first));
    send(&state, "POST", "/nodes", Some(node("Logarithms", &[1.0, 0.0]))).await;
    send(&state, "POST", "/nodes", Some(node("Logarithmic Equations", &[0.95, 0.3]))).await;

    let second: Arc<dyn GraphStore> = Arc::new(FileGraphStore::open(&path).await.unwrap());
    let restarted = Arc::new(AppState::new(test_config(), second));
    let (_, graph) = send(&restarted, "GET", "/graph", None).await;

    assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(graph["links"].as_array().unwrap().len(), 1);
    assert_eq!(graph["version"], 2);
}
