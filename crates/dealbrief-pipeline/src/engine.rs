//! Sequential DAG executor.
//!
//! A run walks the stage table in topological order, one stage at a time.
//! A failing stage is recorded on the submission and the run continues
//! from the state before it; only a fatal stage (initialization) ends the
//! run early. After the last stage the run finalizes the report.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::{self, Stream};

use crate::error::PipelineError;
use crate::finalize::finalize;
use crate::stage::{Stage, StageContext, StageTable};
use crate::state::{StageMessage, StageStatus, Submission, SubmissionInput};

/// Name of the synthetic step that closes every completed run.
pub const FINALIZE_STAGE: &str = "finalize";

pub struct PipelineEngine {
    order: Vec<Arc<dyn Stage>>,
    context: StageContext,
}

impl PipelineEngine {
    /// Resolve the execution order once, up front.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the table has unknown edges or a cycle.
    pub fn new(table: &StageTable, context: StageContext) -> Result<Self, PipelineError> {
        Ok(Self {
            order: table.topological_order()?,
            context,
        })
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.order.iter().map(|s| s.name()).collect()
    }

    /// Start a run. Nothing executes until the first snapshot is pulled.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] when a required field is
    /// blank.
    pub fn run(&self, input: SubmissionInput) -> Result<PipelineRun, PipelineError> {
        input.validate()?;
        Ok(PipelineRun {
            stages: self.order.clone(),
            context: self.context.clone(),
            submission: Submission::new(input, Utc::now()),
            next: 0,
            started: Instant::now(),
            finished: false,
        })
    }
}

/// State right after one stage.
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub stage: &'static str,
    pub status: StageStatus,
    /// Set on the last snapshot of a run a fatal stage ended.
    pub aborted: bool,
    pub submission: Submission,
}

/// One in-flight execution. Finite and not restartable.
pub struct PipelineRun {
    stages: Vec<Arc<dyn Stage>>,
    context: StageContext,
    submission: Submission,
    next: usize,
    started: Instant,
    finished: bool,
}

impl PipelineRun {
    #[must_use]
    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    fn snapshot(&self, stage: &'static str, status: StageStatus, aborted: bool) -> StageSnapshot {
        StageSnapshot {
            stage,
            status,
            aborted,
            submission: self.submission.clone(),
        }
    }

    /// Execute the next stage and return the state after it, or `None` once
    /// the run has finished.
    pub async fn next_snapshot(&mut self) -> Option<StageSnapshot> {
        if self.finished {
            return None;
        }

        let Some(stage) = self.stages.get(self.next).cloned() else {
            self.finished = true;
            let report = finalize(&self.submission, self.started.elapsed());
            tracing::info!(
                submission_id = %self.submission.id,
                has_errors = report.metadata.has_errors,
                execution_time_secs = report.metadata.execution_time_secs,
                "pipeline finished"
            );
            self.submission.final_report = Some(report);
            self.submission.messages.push(StageMessage {
                stage: FINALIZE_STAGE.to_string(),
                status: StageStatus::Done,
                error: None,
                timestamp: Utc::now(),
            });
            return Some(self.snapshot(FINALIZE_STAGE, StageStatus::Done, false));
        };
        self.next += 1;

        let name = stage.name();
        tracing::debug!(submission_id = %self.submission.id, stage = name, "stage starting");
        match stage.execute(&self.context, &self.submission).await {
            Ok(delta) => {
                self.submission.apply(delta);
                self.submission.messages.push(StageMessage {
                    stage: name.to_string(),
                    status: StageStatus::Done,
                    error: None,
                    timestamp: Utc::now(),
                });
                tracing::info!(submission_id = %self.submission.id, stage = name, "stage done");
                Some(self.snapshot(name, StageStatus::Done, false))
            }
            Err(e) => {
                let error = format!("Stage {name} failed: {e}");
                self.submission.errors.push(error.clone());
                self.submission.messages.push(StageMessage {
                    stage: name.to_string(),
                    status: StageStatus::Error,
                    error: Some(e.to_string()),
                    timestamp: Utc::now(),
                });

                let aborted = stage.is_fatal();
                if aborted {
                    self.finished = true;
                    tracing::error!(submission_id = %self.submission.id, stage = name, error = %e, "fatal stage failed, aborting run");
                } else {
                    tracing::warn!(submission_id = %self.submission.id, stage = name, error = %e, "stage failed, continuing");
                }
                Some(self.snapshot(name, StageStatus::Error, aborted))
            }
        }
    }

    /// The run as a stream of snapshots.
    pub fn into_stream(self) -> impl Stream<Item = StageSnapshot> + Send {
        stream::unfold(self, |mut run| async move {
            let snapshot = run.next_snapshot().await?;
            Some((snapshot, run))
        })
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
