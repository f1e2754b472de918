//! topicmap HTTP REST API
//!
//! Axum-based HTTP server exposing the knowledge graph to the study UI.
//! Runs alongside the Unix socket IPC server on port 8766 (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function;
//! the inner functions go through the same router as IPC requests and are
//! directly testable without axum dispatch.
//!
//! Endpoints:
//! - GET    /health               — store status and graph counts
//! - GET    /version              — server version info
//! - GET    /graph                — nodes, links and version
//! - DELETE /graph                — clear the graph
//! - GET    /nodes                — all nodes in insertion order
//! - POST   /nodes                — add a node from a label + embedding
//! - GET    /nodes/:id            — one node
//! - DELETE /nodes/:id            — delete a node and its links
//! - GET    /nodes/:id/neighbors  — linked nodes, most similar first
//! - POST   /sessions             — run the session ingest pipeline
//! - GET    /events               — server-sent graph change events

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use topicmap_core::ipc::{GraphRequest, GraphResponse};
use topicmap_core::{GraphChange, NodeDraft, SessionTranscript};
use uuid::Uuid;

use crate::router::{handle_request, AppState};

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/graph", get(graph_handler).delete(clear_handler))
        .route("/nodes", get(list_nodes_handler).post(add_node_handler))
        .route("/nodes/:id", get(get_node_handler).delete(delete_node_handler))
        .route("/nodes/:id/neighbors", get(neighbors_handler))
        .route("/sessions", post(ingest_session_handler))
        .route("/events", get(events_handler))
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", state.config.http.host, state.config.http.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("topicmap HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

pub async fn health_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    let response = handle_request(GraphRequest::Health, state).await;
    if !response.is_ok() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "error": response.error.unwrap_or_default(),
            }),
        );
    }

    let mut body = response.data.unwrap_or_else(|| json!({}));
    if let Some(obj) = body.as_object_mut() {
        obj.insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));
        obj.insert("socket".to_string(), json!(state.config.service.socket_path));
    }
    (StatusCode::OK, body)
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "topicmap/1",
    })
}

pub async fn graph_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    response_to_http(handle_request(GraphRequest::Graph, state).await)
}

pub async fn clear_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    response_to_http(handle_request(GraphRequest::Clear, state).await)
}

pub async fn list_nodes_inner(state: &AppState) -> (StatusCode, serde_json::Value) {
    response_to_http(handle_request(GraphRequest::ListNodes, state).await)
}

pub async fn add_node_inner(state: &AppState, node: NodeDraft) -> (StatusCode, serde_json::Value) {
    match response_to_http(handle_request(GraphRequest::AddNode { node }, state).await) {
        (status, body) if status == StatusCode::OK => (StatusCode::CREATED, body),
        other => other,
    }
}

pub async fn get_node_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    response_to_http(handle_request(GraphRequest::GetNode { id }, state).await)
}

pub async fn delete_node_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    response_to_http(handle_request(GraphRequest::DeleteNode { id }, state).await)
}

pub async fn neighbors_inner(state: &AppState, id: Uuid) -> (StatusCode, serde_json::Value) {
    response_to_http(handle_request(GraphRequest::Neighbors { id }, state).await)
}

/// 201 when a node was created, 200 when the session was skipped.
pub async fn ingest_session_inner(
    state: &AppState,
    transcript: SessionTranscript,
) -> (StatusCode, serde_json::Value) {
    match response_to_http(handle_request(GraphRequest::IngestSession { transcript }, state).await) {
        (status, body) if status == StatusCode::OK && body["outcome"] == "created" => {
            (StatusCode::CREATED, body)
        }
        other => other,
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn graph_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = graph_inner(&state).await;
    (status, Json(body))
}

pub async fn clear_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = clear_inner(&state).await;
    (status, Json(body))
}

pub async fn list_nodes_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = list_nodes_inner(&state).await;
    (status, Json(body))
}

pub async fn add_node_handler(
    State(state): State<Arc<AppState>>,
    Json(node): Json<NodeDraft>,
) -> impl IntoResponse {
    let (status, body) = add_node_inner(&state, node).await;
    (status, Json(body))
}

pub async fn get_node_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = get_node_inner(&state, id).await;
    (status, Json(body))
}

pub async fn delete_node_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = delete_node_inner(&state, id).await;
    (status, Json(body))
}

pub async fn neighbors_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = neighbors_inner(&state, id).await;
    (status, Json(body))
}

pub async fn ingest_session_handler(
    State(state): State<Arc<AppState>>,
    Json(transcript): Json<SessionTranscript>,
) -> impl IntoResponse {
    let (status, body) = ingest_session_inner(&state, transcript).await;
    (status, Json(body))
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    Sse::new(change_events(state.mutator.subscribe())).keep_alive(KeepAlive::default())
}

// ============================================================================
// Helpers
// ============================================================================

/// Turns graph changes into SSE events. A lagging subscriber skips what it
/// missed; the stream ends when the mutator is dropped.
pub fn change_events(
    rx: broadcast::Receiver<GraphChange>,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(change) => match Event::default().event("graph_change").json_data(&change) {
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(e) => tracing::error!("Failed to encode graph change: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE subscriber lagged, dropping events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

/// Convert a router `GraphResponse` into an HTTP status and JSON body.
pub fn response_to_http(response: GraphResponse) -> (StatusCode, serde_json::Value) {
    let status = match response.status.as_str() {
        "ok" => return (StatusCode::OK, response.data.unwrap_or_else(|| json!({}))),
        "not_found" => StatusCode::NOT_FOUND,
        "invalid" => StatusCode::BAD_REQUEST,
        "unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        json!({
            "error": response.error.unwrap_or_else(|| "unknown error".to_string()),
            "status": response.status,
        }),
    )
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================
