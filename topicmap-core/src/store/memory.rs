use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{GraphStore, Snapshot, StoreError};
use crate::models::KnowledgeGraph;

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    state: Mutex<Snapshot>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with `graph` at version 1.
    pub fn with_graph(graph: KnowledgeGraph) -> Self {
        Self {
            state: Mutex::new(Snapshot { graph, version: 1 }),
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        if state.version != expected_version {
            return Err(StoreError::Conflict {
                expected: expected_version,
                found: state.version,
            });
        }
        state.graph = graph.clone();
        state.version += 1;
        Ok(state.version)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
