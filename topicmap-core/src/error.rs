use thiserror::Error;

use crate::embeddings::EmbeddingError;
use crate::extractor::ExtractionError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum TopicMapError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Topic extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(#[from] EmbeddingError),

    #[error("Store read failed: {0}")]
    StoreReadFailed(#[source] StoreError),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(#[source] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

impl TopicMapError {
    /// True when a write lost an optimistic-concurrency race and may be retried.
    pub fn is_conflict(&self) -> bool {
        matches!(self, TopicMapError::StoreWriteFailed(StoreError::Conflict { .. }))
    }

    /// Errors caused by the caller's input rather than by a collaborator or the store.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            TopicMapError::DimensionMismatch { .. } | TopicMapError::InvalidEmbedding(_)
        )
    }
}

pub type Result<T, E = TopicMapError> = std::result::Result<T, E>;
