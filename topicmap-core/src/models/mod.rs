pub mod graph;
pub mod link;
pub mod node;
pub mod transcript;

pub use graph::KnowledgeGraph;
pub use link::GraphLink;
pub use node::{GraphNode, NodeDraft};
pub use transcript::{Role, SessionTranscript, Turn};
