use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{NodeDraft, SessionTranscript};

pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GraphRequest {
    Ping,
    Health,
    /// Full pipeline: extract a label, embed it, add the node.
    IngestSession {
        transcript: SessionTranscript,
    },
    /// Adds a node whose label and embedding the caller already has.
    AddNode {
        node: NodeDraft,
    },
    DeleteNode {
        id: Uuid,
    },
    Clear,
    GetNode {
        id: Uuid,
    },
    ListNodes,
    Graph,
    Neighbors {
        id: Uuid,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GraphResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl GraphResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self::with_status("ok", Some(data), None)
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self::with_status("error", None, Some(msg.into()))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_status("not_found", None, Some(msg.into()))
    }

    /// The request was understood but its input was rejected.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::with_status("invalid", None, Some(msg.into()))
    }

    /// A required collaborator is not configured.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::with_status("unavailable", None, Some(msg.into()))
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    fn with_status(status: &str, data: Option<serde_json::Value>, error: Option<String>) -> Self {
        Self {
            status: status.to_string(),
            data,
            error,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}
