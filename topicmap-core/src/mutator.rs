//! Graph mutation — the only code that writes the knowledge graph.
//!
//! Every operation is a read-modify-write of the whole snapshot:
//! `load → mutate in memory → save(expected_version)`. Writers in this process
//! are serialized by `write_lock`; writers elsewhere are caught by the store's
//! version check, and the losing write is retried from a fresh load with
//! jittered backoff. A failed operation never leaves a partial write behind:
//! the node, its links and the cascade all land in one `save` or not at all.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

use crate::config::LinkingConfig;
use crate::error::{Result, TopicMapError};
use crate::linker::SimilarityLinker;
use crate::models::{GraphLink, GraphNode, KnowledgeGraph, NodeDraft};
use crate::store::{load_or_empty, GraphStore};

/// Backoff base between conflicting writes
const CONFLICT_RETRY_BASE_MS: u64 = 10;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Result of `add_node`: the node and the links it was given.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddedNode {
    pub node: GraphNode,
    pub links: Vec<GraphLink>,
    pub version: u64,
}

/// Published after every successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphChange {
    NodeAdded { node_id: Uuid, links: usize, version: u64 },
    NodeDeleted { node_id: Uuid, links_removed: usize, version: u64 },
    Cleared { version: u64 },
}

pub struct GraphMutator {
    store: Arc<dyn GraphStore>,
    linker: SimilarityLinker,
    max_write_attempts: usize,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<GraphChange>,
}

impl GraphMutator {
    pub fn new(store: Arc<dyn GraphStore>, linker: SimilarityLinker) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            linker,
            max_write_attempts: 3,
            write_lock: Mutex::new(()),
            changes,
        }
    }

    pub fn from_config(store: Arc<dyn GraphStore>, config: &LinkingConfig) -> Self {
        Self::new(store, SimilarityLinker::new(config.similarity_threshold))
            .with_max_write_attempts(config.max_write_attempts as usize)
    }

    pub fn with_max_write_attempts(mut self, attempts: usize) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    pub fn linker(&self) -> &SimilarityLinker {
        &self.linker
    }

    /// Receives a `GraphChange` for every write that lands after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphChange> {
        self.changes.subscribe()
    }

    /// Adds a node, linking it to every existing node at or above the threshold.
    ///
    /// The first node of an empty graph fixes the graph's embedding dimension;
    /// later nodes must match it.
    pub async fn add_node(&self, draft: NodeDraft) -> Result<AddedNode> {
        validate_embedding(&draft.embedding)?;

        // Allocated once so a retried write still creates exactly one node.
        let node = draft.into_node(Uuid::new_v4(), Utc::now());

        let _guard = self.write_lock.lock().await;
        let added = self.with_conflict_retry(|| self.try_add_node(&node)).await?;

        tracing::info!(
            node_id = %added.node.id,
            label = %added.node.label,
            session_id = %added.node.session_id,
            links = added.links.len(),
            version = added.version,
            "Added topic node"
        );
        self.publish(GraphChange::NodeAdded {
            node_id: added.node.id,
            links: added.links.len(),
            version: added.version,
        });

        Ok(added)
    }

    /// Deletes a node and every link touching it. Returns `false` (and writes
    /// nothing) if the node does not exist.
    pub async fn delete_node(&self, node_id: Uuid) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let outcome = self.with_conflict_retry(|| self.try_delete_node(node_id)).await?;

        match outcome {
            Some((links_removed, version)) => {
                tracing::info!(node_id = %node_id, links_removed, version, "Deleted topic node");
                self.publish(GraphChange::NodeDeleted {
                    node_id,
                    links_removed,
                    version,
                });
                Ok(true)
            }
            None => {
                tracing::debug!(node_id = %node_id, "Delete of unknown node ignored");
                Ok(false)
            }
        }
    }

    /// Replaces the graph with an empty one. Returns the new version.
    pub async fn clear(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let version = self.with_conflict_retry(|| self.try_clear()).await?;

        tracing::info!(version, "Cleared knowledge graph");
        self.publish(GraphChange::Cleared { version });
        Ok(version)
    }

    async fn try_add_node(&self, node: &GraphNode) -> Result<AddedNode> {
        let snapshot = load_or_empty(self.store.as_ref()).await;
        let mut graph = snapshot.graph;

        if let Some(expected) = graph.dimension() {
            if node.embedding.len() != expected {
                return Err(TopicMapError::DimensionMismatch {
                    expected,
                    actual: node.embedding.len(),
                });
            }
        }

        let links = self.linker.propose_links(node.id, &node.embedding, &graph.nodes)?;

        graph.nodes.push(node.clone());
        graph.links.extend(links.iter().cloned());

        let version = self.save(&graph, snapshot.version).await?;
        Ok(AddedNode {
            node: node.clone(),
            links,
            version,
        })
    }

    async fn try_delete_node(&self, node_id: Uuid) -> Result<Option<(usize, u64)>> {
        let snapshot = load_or_empty(self.store.as_ref()).await;
        let mut graph = snapshot.graph;

        let Some(links_removed) = graph.remove_node(node_id) else {
            return Ok(None);
        };

        let version = self.save(&graph, snapshot.version).await?;
        Ok(Some((links_removed, version)))
    }

    async fn try_clear(&self) -> Result<u64> {
        let snapshot = load_or_empty(self.store.as_ref()).await;
        self.save(&KnowledgeGraph::default(), snapshot.version).await
    }

    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<u64> {
        self.store
            .save(graph, expected_version)
            .await
            .map_err(TopicMapError::StoreWriteFailed)
    }

    async fn with_conflict_retry<T, F, Fut>(&self, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let strategy = ExponentialBackoff::from_millis(CONFLICT_RETRY_BASE_MS)
            .max_delay(Duration::from_millis(500))
            .map(jitter)
            .take(self.max_write_attempts - 1);

        RetryIf::spawn(strategy, action, |e: &TopicMapError| {
            let retry = e.is_conflict();
            if retry {
                tracing::warn!(store = self.store.name(), error = %e, "Concurrent graph write detected, retrying");
            }
            retry
        })
        .await
    }

    fn publish(&self, change: GraphChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(TopicMapError::InvalidEmbedding("embedding is empty".to_string()));
    }
    if let Some(i) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(TopicMapError::InvalidEmbedding(format!(
            "non-finite value at index {}",
            i
        )));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
