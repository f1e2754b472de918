//! Vector math used for semantic similarity between topic embeddings.

use crate::error::TopicMapError;

/// Cosine similarity between two embeddings of equal length.
///
/// Accumulates in `f64` and clamps the result to `[-1, 1]` so rounding noise
/// never produces a similarity outside the documented range. A zero-norm
/// operand carries no direction and yields `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, TopicMapError> {
    if a.len() != b.len() {
        return Err(TopicMapError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(similarity.clamp(-1.0, 1.0) as f32)
}
