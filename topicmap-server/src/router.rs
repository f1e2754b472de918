use std::sync::Arc;

use serde::Serialize;
use topicmap_core::extractor::ExtractionError;
use topicmap_core::ipc::{GraphRequest, GraphResponse};
use topicmap_core::{GraphMutator, GraphQuery, GraphStore, TopicMapConfig, TopicMapError};

use crate::subsystems::ingest::SessionIngestor;

/// Everything a request handler needs. Shared by the IPC and HTTP servers.
pub struct AppState {
    pub config: TopicMapConfig,
    pub store: Arc<dyn GraphStore>,
    pub mutator: Arc<GraphMutator>,
    pub query: GraphQuery,
    pub ingestor: Option<SessionIngestor>,
}

impl AppState {
    pub fn new(config: TopicMapConfig, store: Arc<dyn GraphStore>) -> Self {
        let mutator = Arc::new(GraphMutator::from_config(store.clone(), &config.linking));
        let query = GraphQuery::new(store.clone());
        Self {
            config,
            store,
            mutator,
            query,
            ingestor: None,
        }
    }

    pub fn with_ingestor(mut self, ingestor: SessionIngestor) -> Self {
        self.ingestor = Some(ingestor);
        self
    }
}

pub async fn handle_request(request: GraphRequest, state: &AppState) -> GraphResponse {
    match request {
        GraphRequest::Ping => GraphResponse::pong(),
        GraphRequest::Health => health(state).await,
        GraphRequest::IngestSession { transcript } => {
            let Some(ingestor) = state.ingestor.as_ref() else {
                return GraphResponse::unavailable(
                    "Session ingest disabled: no Gemini API key configured",
                );
            };
            match ingestor.ingest(&transcript).await {
                Ok(outcome) => data(&outcome),
                Err(e) => error_response(e),
            }
        }
        GraphRequest::AddNode { node } => match state.mutator.add_node(node).await {
            Ok(added) => data(&added),
            Err(e) => error_response(e),
        },
        GraphRequest::DeleteNode { id } => match state.mutator.delete_node(id).await {
            Ok(deleted) => GraphResponse::ok(serde_json::json!({
                "deleted": deleted,
                "id": id,
            })),
            Err(e) => error_response(e),
        },
        GraphRequest::Clear => match state.mutator.clear().await {
            Ok(version) => GraphResponse::ok(serde_json::json!({
                "cleared": true,
                "version": version,
            })),
            Err(e) => error_response(e),
        },
        GraphRequest::GetNode { id } => match state.query.get_by_id(id).await {
            Some(node) => data(&node),
            None => GraphResponse::not_found(format!("Node {} not found", id)),
        },
        GraphRequest::ListNodes => {
            let nodes = state.query.list_all().await;
            data(&serde_json::json!({
                "count": nodes.len(),
                "nodes": nodes,
            }))
        }
        GraphRequest::Graph => {
            let snapshot = state.query.snapshot().await;
            data(&serde_json::json!({
                "nodes": snapshot.graph.nodes,
                "links": snapshot.graph.links,
                "version": snapshot.version,
            }))
        }
        GraphRequest::Neighbors { id } => match state.query.neighbors(id).await {
            Some(neighbors) => data(&serde_json::json!({
                "id": id,
                "neighbors": neighbors,
            })),
            None => GraphResponse::not_found(format!("Node {} not found", id)),
        },
    }
}

/// Reads the store directly so an unreadable snapshot shows up here instead
/// of being masked as an empty graph.
async fn health(state: &AppState) -> GraphResponse {
    match state.store.load().await {
        Ok(snapshot) => GraphResponse::ok(serde_json::json!({
            "status": "healthy",
            "store": state.store.name(),
            "nodes": snapshot.graph.nodes.len(),
            "links": snapshot.graph.links.len(),
            "dimension": snapshot.graph.dimension(),
            "graph_version": snapshot.version,
            "ingest_enabled": state.ingestor.is_some(),
            "similarity_threshold": state.mutator.linker().threshold(),
        })),
        Err(e) => GraphResponse::err(format!("Graph store check failed: {}", e)),
    }
}

fn data<T: Serialize>(value: &T) -> GraphResponse {
    match serde_json::to_value(value) {
        Ok(v) => GraphResponse::ok(v),
        Err(e) => GraphResponse::err(format!("Failed to serialize response: {}", e)),
    }
}

fn error_response(e: TopicMapError) -> GraphResponse {
    match &e {
        TopicMapError::ExtractionFailed(ExtractionError::EmptyTranscript) => {
            GraphResponse::invalid(e.to_string())
        }
        _ if e.is_invalid_input() => GraphResponse::invalid(e.to_string()),
        _ => {
            tracing::error!(error = %e, "Graph request failed");
            GraphResponse::err(e.to_string())
        }
    }
}
