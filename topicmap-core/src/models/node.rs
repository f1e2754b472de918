use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One distilled study session: a topic label plus its embedding.
///
/// `id` doubles as the correlation key for the originating session and any
/// annotation attached to the node elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: Uuid,
    pub label: String,
    pub embedding: Vec<f32>,
    pub session_id: String,
    #[serde(default = "default_message_count")]
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
}

fn default_message_count() -> u32 {
    1
}

/// Input for `GraphMutator::add_node`. Id and timestamp are assigned by the mutator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
    pub label: String,
    pub embedding: Vec<f32>,
    pub session_id: String,
    #[serde(default)]
    pub message_count: Option<u32>,
}

impl NodeDraft {
    pub fn new(label: impl Into<String>, embedding: Vec<f32>, session_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            embedding,
            session_id: session_id.into(),
            message_count: None,
        }
    }

    pub fn with_message_count(mut self, count: u32) -> Self {
        self.message_count = Some(count);
        self
    }

    pub(crate) fn into_node(self, id: Uuid, created_at: DateTime<Utc>) -> GraphNode {
        GraphNode {
            id,
            label: self.label,
            embedding: self.embedding,
            session_id: self.session_id,
            message_count: self.message_count.unwrap_or(1).max(1),
            created_at,
        }
    }
}
