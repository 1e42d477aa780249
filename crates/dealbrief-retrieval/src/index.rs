use dealbrief_core::SourceDocument;

use crate::error::RetrievalError;

/// Compute the cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// In-memory similarity index over one branch's chunks.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    chunks: Vec<SourceDocument>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Pair each chunk with its embedding.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::EmbeddingMismatch`] when the counts differ.
    pub fn build(
        chunks: Vec<SourceDocument>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, RetrievalError> {
        if chunks.len() != vectors.len() {
            return Err(RetrievalError::EmbeddingMismatch {
                expected: chunks.len(),
                actual: vectors.len(),
            });
        }
        Ok(Self { chunks, vectors })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `k` chunks most similar to `query`, best first. Ties keep
    /// insertion order.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<&SourceDocument> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(i, _)| &self.chunks[i])
            .collect()
    }
}
