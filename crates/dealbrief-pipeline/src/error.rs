use dealbrief_resilience::ServiceError;
use dealbrief_retrieval::RetrievalError;
use thiserror::Error;

/// Failure of a single stage body. Recorded on the submission by the engine;
/// never propagated past it unless the stage is fatal.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Submission input rejected by the initialize stage.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Data an upstream stage should have produced is absent.
    #[error("missing upstream data: {0}")]
    Missing(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required submission fields are missing or malformed.
    #[error("invalid submission input: {0}")]
    InvalidInput(String),

    #[error("duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("stage {stage} depends on unknown stage {dependency}")]
    UnknownDependency { stage: String, dependency: String },

    #[error("stage graph contains a cycle through: {0}")]
    Cycle(String),
}
