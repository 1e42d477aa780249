//! Report pipeline: stage table, sequential DAG engine, the concrete seller
//! and prospect stages, and HTTP clients for the external collaborators.

pub mod clients;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod source;
pub mod stage;
pub mod stages;
pub mod state;
pub mod templates;

#[cfg(test)]
pub(crate) mod fakes;

pub use engine::{PipelineEngine, PipelineRun, StageSnapshot, FINALIZE_STAGE};
pub use error::{PipelineError, StageError};
pub use finalize::finalize;
pub use source::ContentSource;
pub use stage::{Stage, StageContext, StageTable};
pub use stages::default_stage_table;
pub use state::{
    BranchDelta, BranchState, FinalMetadata, FinalReport, ReportContext, SectionKind,
    StageMessage, StageStatus, Submission, SubmissionDelta, SubmissionInput,
};
