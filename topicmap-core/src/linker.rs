//! Similarity linking — decides which links a new node gets.
//!
//! A brute-force scan over every existing node: O(n·D) per insertion, which
//! is fine for a personal graph of a few hundred topics. An ANN index can
//! replace the scan behind `propose_links` without changing its contract.

use uuid::Uuid;

use crate::error::TopicMapError;
use crate::models::{GraphLink, GraphNode};
use crate::vector::cosine_similarity;

/// Minimum cosine similarity to create a link
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy)]
pub struct SimilarityLinker {
    threshold: f32,
}

impl Default for SimilarityLinker {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl SimilarityLinker {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Scores `embedding` against every node except `candidate_id` and returns a
    /// link for each one at or above the threshold, in scan order.
    ///
    /// Fan-out is unbounded. Fails with `DimensionMismatch` if any existing
    /// node has a different embedding length.
    pub fn propose_links(
        &self,
        candidate_id: Uuid,
        embedding: &[f32],
        existing: &[GraphNode],
    ) -> Result<Vec<GraphLink>, TopicMapError> {
        let mut links = Vec::new();

        for node in existing.iter().filter(|n| n.id != candidate_id) {
            let similarity = cosine_similarity(embedding, &node.embedding)?;
            if similarity >= self.threshold {
                links.push(GraphLink {
                    source: candidate_id,
                    target: node.id,
                    similarity,
                });
            }
        }

        tracing::debug!(
            candidate = %candidate_id,
            scanned = existing.len(),
            linked = links.len(),
            threshold = self.threshold,
            "Scored candidate against existing nodes"
        );

        Ok(links)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeDraft;
    use chrono::Utc;

    fn make_node(label: &str, embedding: Vec<f32>) -> GraphNode {
        NodeDraft::new(label, embedding, "session").into_node(Uuid::new_v4(), Utc::now())
    }

    // ========================================================================
    // TEST 1: identical embeddings link with similarity 1.0
    // ========================================================================
    #[test]
    fn test_links_identical_embedding() {
        let linker = SimilarityLinker::default();
        let a = make_node("A", vec![1.0, 0.0]);
        let candidate = Uuid::new_v4();

        let links = linker
            .propose_links(candidate, &[1.0, 0.0], std::slice::from_ref(&a))
            .unwrap();

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].source, candidate);
        assert_eq!(links[0].target, a.id);
        assert_eq!(links[0].similarity, 1.0);
    }

    // ========================================================================
    // TEST 2: orthogonal embeddings do not link
    // ========================================================================
    #[test]
    fn test_skips_below_threshold() {
        let linker = SimilarityLinker::default();
        let a = make_node("A", vec![1.0, 0.0]);

        let links = linker.propose_links(Uuid::new_v4(), &[0.0, 1.0], &[a]).unwrap();

        assert!(links.is_empty());
    }

    // ========================================================================
    // TEST 3: threshold is inclusive
    // ========================================================================
    #[test]
    fn test_threshold_is_inclusive() {
        let linker = SimilarityLinker::new(1.0);
        let a = make_node("A", vec![2.0, 0.0]);

        let links = linker.propose_links(Uuid::new_v4(), &[1.0, 0.0], &[a]).unwrap();

        assert_eq!(links.len(), 1);
    }

    // ========================================================================
    // TEST 4: candidate never links to itself
    // ========================================================================
    #[test]
    fn test_excludes_candidate_id() {
        let linker = SimilarityLinker::default();
        let a = make_node("A", vec![1.0, 0.0]);

        let links = linker.propose_links(a.id, &[1.0, 0.0], std::slice::from_ref(&a)).unwrap();

        assert!(links.is_empty());
    }

    // ========================================================================
    // TEST 5: fan-out is unbounded and follows scan order
    // ========================================================================
    #[test]
    fn test_unbounded_fan_out_in_scan_order() {
        let linker = SimilarityLinker::new(0.5);
        let nodes: Vec<GraphNode> = (0..10)
            .map(|i| make_node(&format!("N{}", i), vec![1.0, i as f32 * 0.01]))
            .collect();

        let links = linker.propose_links(Uuid::new_v4(), &[1.0, 0.0], &nodes).unwrap();

        assert_eq!(links.len(), 10);
        let targets: Vec<Uuid> = links.iter().map(|l| l.target).collect();
        let expected: Vec<Uuid> = nodes.iter().map(|n| n.id).collect();
        assert_eq!(targets, expected);
    }

    // ========================================================================
    // TEST 6: configurable threshold changes the outcome
    // ========================================================================
    #[test]
    fn test_threshold_is_configurable() {
        let a = make_node("A", vec![1.0, 1.0]);
        let embedding = [1.0, 0.0];

        let strict = SimilarityLinker::new(0.8).propose_links(Uuid::new_v4(), &embedding, std::slice::from_ref(&a));
        let loose = SimilarityLinker::new(0.7).propose_links(Uuid::new_v4(), &embedding, std::slice::from_ref(&a));

        // cos(45°) ≈ 0.707
        assert!(strict.unwrap().is_empty());
        assert_eq!(loose.unwrap().len(), 1);
    }

    // ========================================================================
    // TEST 7: mixed dimensions are rejected
    // ========================================================================
    #[test]
    fn test_dimension_mismatch_propagates() {
        let linker = SimilarityLinker::default();
        let a = make_node("A", vec![1.0, 0.0, 0.0]);

        let result = linker.propose_links(Uuid::new_v4(), &[1.0, 0.0], &[a]);

        assert!(matches!(result, Err(TopicMapError::DimensionMismatch { .. })));
    }

    // ========================================================================
    // TEST 8: empty graph yields no links
    // ========================================================================
    #[test]
    fn test_empty_graph_yields_no_links() {
        let links = SimilarityLinker::default()
            .propose_links(Uuid::new_v4(), &[0.3, 0.4], &[])
            .unwrap();
        assert!(links.is_empty());
    }
}
