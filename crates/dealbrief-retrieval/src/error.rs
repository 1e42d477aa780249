use dealbrief_resilience::ServiceError;
use thiserror::Error;

/// Failures that stop a retrieval before any context can be assembled.
///
/// Per-query search and completion failures are not errors: they are logged
/// and the loop continues with what it has.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding documents failed: {0}")]
    Embedding(#[source] ServiceError),

    #[error("embedding service returned {actual} vectors for {expected} chunks")]
    EmbeddingMismatch { expected: usize, actual: usize },
}
