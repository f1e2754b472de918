//! Session ingest — turns a study-session transcript into a topic node.
//!
//! Pipeline: topic-worthiness gate → label extraction → sentinel policy →
//! embedding → `GraphMutator::add_node`. Both external calls finish before the
//! graph is touched, so a failed call leaves the graph exactly as it was.

use std::sync::Arc;

use serde::Serialize;
use topicmap_core::config::{ExtractionConfig, UndeterminedPolicy};
use topicmap_core::extractor::{is_undetermined, normalize_label};
use topicmap_core::{
    AddedNode, EmbeddingBackend, GraphMutator, NodeDraft, SessionTranscript, TopicExtractor,
    TopicMapError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Too few assistant replies to name a topic yet.
    NotTopicWorthy,
    /// The extractor returned the undetermined-topic sentinel.
    Undetermined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Created(AddedNode),
    Skipped { reason: SkipReason, label: Option<String> },
}

pub struct SessionIngestor {
    extractor: Arc<dyn TopicExtractor>,
    embedder: Arc<dyn EmbeddingBackend>,
    mutator: Arc<GraphMutator>,
    undetermined_label: String,
    policy: UndeterminedPolicy,
    min_assistant_replies: usize,
}

impl SessionIngestor {
    pub fn new(
        extractor: Arc<dyn TopicExtractor>,
        embedder: Arc<dyn EmbeddingBackend>,
        mutator: Arc<GraphMutator>,
        settings: &ExtractionConfig,
    ) -> Self {
        Self {
            extractor,
            embedder,
            mutator,
            undetermined_label: settings.undetermined_label.clone(),
            policy: settings.undetermined_policy,
            min_assistant_replies: settings.min_assistant_replies,
        }
    }

    pub async fn ingest(&self, transcript: &SessionTranscript) -> Result<IngestOutcome, TopicMapError> {
        let replies = transcript.assistant_replies();
        if replies < self.min_assistant_replies {
            tracing::debug!(
                session_id = %transcript.session_id,
                replies,
                required = self.min_assistant_replies,
                "Session not topic-worthy yet"
            );
            return Ok(IngestOutcome::Skipped {
                reason: SkipReason::NotTopicWorthy,
                label: None,
            });
        }

        let raw = self.extractor.extract_label(transcript).await?;
        let label = normalize_label(&raw)?;

        if is_undetermined(&label, &self.undetermined_label) {
            match self.policy {
                UndeterminedPolicy::Skip => {
                    tracing::info!(
                        session_id = %transcript.session_id,
                        extractor = self.extractor.name(),
                        "Topic undetermined, no node created"
                    );
                    return Ok(IngestOutcome::Skipped {
                        reason: SkipReason::Undetermined,
                        label: Some(label),
                    });
                }
                UndeterminedPolicy::Create => {
                    tracing::debug!(session_id = %transcript.session_id, "Creating node for undetermined topic");
                }
            }
        }

        let embedding = self.embedder.embed(&label).await?;

        let draft = NodeDraft::new(label, embedding, transcript.session_id.clone())
            .with_message_count(transcript.message_count());
        let added = self.mutator.add_node(draft).await?;

        Ok(IngestOutcome::Created(added))
    }
}
