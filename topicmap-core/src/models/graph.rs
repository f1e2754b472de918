use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::{GraphLink, GraphNode};

/// The persisted aggregate: every node and every similarity link.
///
/// Nodes keep insertion order. Stores read and write this as a single unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub links: Vec<GraphLink>,
}

impl KnowledgeGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Embedding dimension established by the first node, `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.nodes.first().map(|n| n.embedding.len())
    }

    pub fn node(&self, id: Uuid) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.node(id).is_some()
    }

    /// Removes a node and every link touching it.
    ///
    /// Returns the number of links removed, or `None` if the node was absent.
    pub fn remove_node(&mut self, id: Uuid) -> Option<usize> {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return None;
        }

        let links_before = self.links.len();
        self.links.retain(|l| !l.touches(id));
        Some(links_before - self.links.len())
    }

    /// Drops links whose endpoints are missing or identical. Returns how many were dropped.
    pub fn prune_dangling_links(&mut self) -> usize {
        let ids: HashSet<Uuid> = self.nodes.iter().map(|n| n.id).collect();
        let before = self.links.len();
        self.links
            .retain(|l| l.source != l.target && ids.contains(&l.source) && ids.contains(&l.target));
        before - self.links.len()
    }

    /// Links incident to `id`, in stored order.
    pub fn links_of(&self, id: Uuid) -> impl Iterator<Item = &GraphLink> {
        self.links.iter().filter(move |l| l.touches(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeDraft;
    use chrono::Utc;

    fn node(label: &str, embedding: Vec<f32>) -> GraphNode {
        NodeDraft::new(label, embedding, format!("session-{}", label)).into_node(Uuid::new_v4(), Utc::now())
    }

    fn link(a: &GraphNode, b: &GraphNode) -> GraphLink {
        GraphLink {
            source: a.id,
            target: b.id,
            similarity: 0.9,
        }
    }

    #[test]
    fn test_dimension_follows_first_node() {
        let mut graph = KnowledgeGraph::default();
        assert_eq!(graph.dimension(), None);
        graph.nodes.push(node("a", vec![1.0, 0.0, 0.0]));
        assert_eq!(graph.dimension(), Some(3));
    }

    #[test]
    fn test_remove_node_cascades_links() {
        let a = node("a", vec![1.0, 0.0]);
        let b = node("b", vec![1.0, 0.0]);
        let c = node("c", vec![0.9, 0.1]);
        let mut graph = KnowledgeGraph {
            links: vec![link(&b, &a), link(&c, &a), link(&c, &b)],
            nodes: vec![a.clone(), b.clone(), c.clone()],
        };

        let removed = graph.remove_node(a.id);

        assert_eq!(removed, Some(2));
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.links.len(), 1);
        assert!(graph.links.iter().all(|l| !l.touches(a.id)));
    }

    #[test]
    fn test_remove_missing_node_is_none() {
        let mut graph = KnowledgeGraph {
            nodes: vec![node("a", vec![1.0])],
            links: vec![],
        };
        assert_eq!(graph.remove_node(Uuid::new_v4()), None);
        assert_eq!(graph.nodes.len(), 1);
    }

    #[test]
    fn test_prune_dangling_links() {
        let a = node("a", vec![1.0, 0.0]);
        let b = node("b", vec![1.0, 0.0]);
        let ghost = node("ghost", vec![1.0, 0.0]);
        let mut graph = KnowledgeGraph {
            links: vec![link(&b, &a), link(&ghost, &a), link(&a, &a)],
            nodes: vec![a.clone(), b.clone()],
        };

        assert_eq!(graph.prune_dangling_links(), 2);
        assert_eq!(graph.links, vec![link(&b, &a)]);
    }

    #[test]
    fn test_serializes_with_camel_case_fields() {
        let a = node("Logarithms", vec![0.5, 0.5]);
        let graph = KnowledgeGraph {
            nodes: vec![a.clone()],
            links: vec![],
        };

        let json = serde_json::to_value(&graph).unwrap();
        let first = &json["nodes"][0];
        assert_eq!(first["label"], "Logarithms");
        assert!(first["sessionId"].is_string());
        assert_eq!(first["messageCount"], 1);
        assert!(first["createdAt"].is_string());
    }

    #[test]
    fn test_missing_message_count_defaults_to_one() {
        let json = serde_json::json!({
            "nodes": [{
                "id": "7b5c24ab-1234-4678-9abc-def012345678",
                "label": "Mitosis",
                "embedding": [0.1, 0.2],
                "sessionId": "s-1",
                "createdAt": "2026-02-23T10:00:00Z"
            }]
        });
        let graph: KnowledgeGraph = serde_json::from_value(json).unwrap();
        assert_eq!(graph.nodes[0].message_count, 1);
        assert!(graph.links.is_empty());
    }
}
