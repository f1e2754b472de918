//! Collaborator and store construction from `TopicMapConfig`.
//!
//! The Gemini clients need an API key; without one the server still runs and
//! only session ingest is unavailable.

use std::sync::Arc;

use topicmap_core::config::StoreBackend;
use topicmap_core::{
    EmbeddingBackend, EmbeddingClientConfig, ExtractorClientConfig, FileGraphStore,
    GeminiEmbeddingClient, GeminiTopicExtractor, GraphMutator, GraphStore, MemoryGraphStore,
    PgGraphStore, StoreError, TopicExtractor, TopicMapConfig,
};

use crate::subsystems::ingest::SessionIngestor;

/// Opens the store selected by `[store] backend`.
pub async fn open_store(config: &TopicMapConfig) -> Result<Arc<dyn GraphStore>, StoreError> {
    let store: Arc<dyn GraphStore> = match config.store.backend {
        StoreBackend::File => Arc::new(FileGraphStore::open(&config.store.path).await?),
        StoreBackend::Memory => Arc::new(MemoryGraphStore::new()),
        StoreBackend::Postgres => {
            let database = config.database.as_ref().ok_or_else(|| {
                StoreError::Unavailable("store.backend = \"postgres\" requires a [database] section".to_string())
            })?;
            Arc::new(PgGraphStore::connect(database, &config.store.graph_key).await?)
        }
    };
    tracing::info!(backend = store.name(), "Graph store opened");
    Ok(store)
}

pub fn create_embedding_backend(config: &TopicMapConfig) -> anyhow::Result<Arc<dyn EmbeddingBackend>> {
    let client = GeminiEmbeddingClient::new(EmbeddingClientConfig::from_settings(&config.embedding))?;
    Ok(Arc::new(client))
}

pub fn create_extractor(config: &TopicMapConfig) -> anyhow::Result<Arc<dyn TopicExtractor>> {
    let client = GeminiTopicExtractor::new(ExtractorClientConfig::from_settings(&config.extraction))?;
    Ok(Arc::new(client))
}

/// Builds the ingest pipeline, or `None` when a collaborator is unavailable.
pub fn create_ingestor(config: &TopicMapConfig, mutator: Arc<GraphMutator>) -> Option<SessionIngestor> {
    let extractor = match create_extractor(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Session ingest disabled: topic extractor unavailable: {}", e);
            return None;
        }
    };
    let embedder = match create_embedding_backend(config) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Session ingest disabled: embedding backend unavailable: {}", e);
            return None;
        }
    };

    tracing::info!(
        extractor = extractor.name(),
        embedder = embedder.name(),
        dimensions = embedder.dimensions(),
        "Session ingest enabled"
    );
    Some(SessionIngestor::new(extractor, embedder, mutator, &config.extraction))
}
