//! Graph persistence. The whole `KnowledgeGraph` is read and written as one unit.
//!
//! Every stored snapshot carries a version. `save` is a compare-and-swap on
//! that version so two writers sharing a store cannot silently overwrite each
//! other; the loser gets `StoreError::Conflict` and retries from a fresh load.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::TopicMapError;
use crate::models::KnowledgeGraph;

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileGraphStore;
pub use memory::MemoryGraphStore;
pub use postgres::PgGraphStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Version conflict: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A loaded graph and the version it was read at. Version 0 means nothing has
/// been persisted yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub graph: KnowledgeGraph,
    pub version: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Reads the current snapshot. A store with nothing persisted returns an
    /// empty graph at version 0.
    async fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replaces the stored graph if its version still equals `expected_version`.
    /// Returns the new version.
    async fn save(&self, graph: &KnowledgeGraph, expected_version: u64) -> Result<u64, StoreError>;

    /// Releases connections or handles. Called once on shutdown.
    async fn close(&self) {}

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Loads a snapshot, degrading any read failure to an empty graph at version 0.
///
/// Dangling links left behind by older writers are pruned so the returned
/// graph always satisfies the referential invariant.
pub async fn load_or_empty(store: &dyn GraphStore) -> Snapshot {
    match store.load().await {
        Ok(mut snapshot) => {
            let pruned = snapshot.graph.prune_dangling_links();
            if pruned > 0 {
                tracing::warn!(
                    store = store.name(),
                    pruned,
                    version = snapshot.version,
                    "Dropped links referencing missing nodes"
                );
            }
            snapshot
        }
        Err(e) => {
            let err = TopicMapError::StoreReadFailed(e);
            tracing::warn!(
                store = store.name(),
                error = %err,
                "Graph snapshot unreadable — continuing with an empty graph"
            );
            Snapshot::empty()
        }
    }
}
