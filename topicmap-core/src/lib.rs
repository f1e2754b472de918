pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ipc;
pub mod linker;
pub mod models;
pub mod mutator;
pub mod query;
pub mod store;
pub mod vector;

pub use config::TopicMapConfig;
pub use embeddings::{
    EmbeddingBackend, EmbeddingClientConfig, EmbeddingError, GeminiEmbeddingClient, TaskType,
    GEMINI_DIMENSIONS,
};
pub use error::TopicMapError;
pub use extractor::{
    normalize_label, ExtractionError, ExtractorClientConfig, GeminiTopicExtractor, TopicExtractor,
    UNDETERMINED_LABEL,
};
pub use linker::{SimilarityLinker, DEFAULT_SIMILARITY_THRESHOLD};
pub use models::{GraphLink, GraphNode, KnowledgeGraph, NodeDraft, Role, SessionTranscript, Turn};
pub use mutator::{AddedNode, GraphChange, GraphMutator};
pub use query::{GraphQuery, GraphSummary, Neighbor};
pub use store::{FileGraphStore, GraphStore, MemoryGraphStore, PgGraphStore, Snapshot, StoreError};
pub use vector::cosine_similarity;
