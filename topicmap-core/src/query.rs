//! Read-only views over the persisted graph.
//!
//! Every call loads a fresh snapshot, so results reflect the last successful
//! write from any process sharing the store.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{GraphNode, KnowledgeGraph};
use crate::store::{load_or_empty, GraphStore, Snapshot};

/// A node adjacent to the queried one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub node: GraphNode,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub nodes: usize,
    pub links: usize,
    pub dimension: Option<usize>,
    pub version: u64,
}

#[derive(Clone)]
pub struct GraphQuery {
    store: Arc<dyn GraphStore>,
}

impl GraphQuery {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Option<GraphNode> {
        let snapshot = load_or_empty(self.store.as_ref()).await;
        snapshot.graph.nodes.into_iter().find(|n| n.id == id)
    }

    /// All nodes in insertion order.
    pub async fn list_all(&self) -> Vec<GraphNode> {
        load_or_empty(self.store.as_ref()).await.graph.nodes
    }

    pub async fn graph(&self) -> KnowledgeGraph {
        load_or_empty(self.store.as_ref()).await.graph
    }

    pub async fn snapshot(&self) -> Snapshot {
        load_or_empty(self.store.as_ref()).await
    }

    /// Nodes linked to `id` in either direction, most similar first.
    /// `None` if the node does not exist.
    pub async fn neighbors(&self, id: Uuid) -> Option<Vec<Neighbor>> {
        let graph = load_or_empty(self.store.as_ref()).await.graph;
        if !graph.contains(id) {
            return None;
        }

        let mut neighbors: Vec<Neighbor> = graph
            .links_of(id)
            .filter_map(|link| {
                let other = link.other_end(id)?;
                let node = graph.node(other)?.clone();
                Some(Neighbor {
                    node,
                    similarity: link.similarity,
                })
            })
            .collect();
        neighbors.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        Some(neighbors)
    }

    pub async fn summary(&self) -> GraphSummary {
        let snapshot = load_or_empty(self.store.as_ref()).await;
        GraphSummary {
            nodes: snapshot.graph.nodes.len(),
            links: snapshot.graph.links.len(),
            dimension: snapshot.graph.dimension(),
            version: snapshot.version,
        }
    }
}
