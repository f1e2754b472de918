use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Similarity edge created when a new node is added.
///
/// `source` is always the newer node. `similarity` is cached at creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: Uuid,
    pub target: Uuid,
    pub similarity: f32,
}

impl GraphLink {
    pub fn touches(&self, id: Uuid) -> bool {
        self.source == id || self.target == id
    }

    /// The endpoint opposite `id`, if this link touches it.
    pub fn other_end(&self, id: Uuid) -> Option<Uuid> {
        if self.source == id {
            Some(self.target)
        } else if self.target == id {
            Some(self.source)
        } else {
            None
        }
    }
}
