//! Drives one pipeline run and translates its snapshots into the fixed
//! ten-step progress sequence observers see.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dealbrief_core::ProgressEvent;
use dealbrief_pipeline::stages::{
    INITIALIZE, PROSPECT_DISCOVERY, PROSPECT_FETCH, PROSPECT_JOBS, PROSPECT_MACRO_TRENDS,
    PROSPECT_NEWS, SELLER_DISCOVERY, SELLER_FETCH, SELLER_REPORT,
};
use dealbrief_pipeline::{PipelineRun, Submission, FINALIZE_STAGE};
use futures::FutureExt;

use crate::delivery::ReportDelivery;
use crate::hub::ProgressHub;

pub const TOTAL_STEPS: usize = 10;

/// Characters of an error kept in the "Execution Error" step.
const ERROR_OUTPUT_CHARS: usize = 500;

/// UI step reached once `stage` has run.
fn step_for_stage(stage: &str) -> Option<usize> {
    let idx = match stage {
        INITIALIZE => 0,
        SELLER_DISCOVERY => 1,
        SELLER_FETCH => 2,
        SELLER_REPORT => 3,
        PROSPECT_DISCOVERY => 4,
        PROSPECT_FETCH => 5,
        PROSPECT_NEWS => 6,
        PROSPECT_JOBS => 7,
        PROSPECT_MACRO_TRENDS => 8,
        FINALIZE_STAGE => 9,
        _ => return None,
    };
    Some(idx)
}

fn step_event(idx: usize, submission: &Submission) -> ProgressEvent {
    let (message, details, output) = match idx {
        0 => (
            "Initializing AI analysis engine",
            "Validating inputs and preparing research tools".to_string(),
            "Analysis framework ready.",
        ),
        1 => (
            "Crawling your company website",
            format!("Extracting key information about {}", submission.seller_name),
            "Analyzing website structure and key capabilities.",
        ),
        2 => (
            "Processing your company data",
            "Analyzing your services and expertise".to_string(),
            "Extracting core capabilities and value propositions.",
        ),
        3 => (
            "Generating your company profile",
            "Creating a comprehensive analysis of your services".to_string(),
            "Profile generated with key strengths and capabilities.",
        ),
        4 => (
            "Crawling target company website",
            format!("Gathering public information about {}", submission.prospect_name),
            "Website structure analyzed and core pages identified.",
        ),
        5 => (
            "Analyzing target company data",
            "Extracting business model and operations".to_string(),
            "Key business areas and company structure identified.",
        ),
        6 => (
            "Researching target's news and market position",
            "Gathering recent company news and updates".to_string(),
            "Collected latest news, market information, and business developments.",
        ),
        7 => (
            "Analyzing target's job postings",
            "Identifying hiring patterns and growth areas".to_string(),
            "Job listings analyzed for business priorities and expansion areas.",
        ),
        8 => (
            "Identifying industry trends and market context",
            "Researching relevant industry developments".to_string(),
            "Industry trends and market dynamics analyzed.",
        ),
        _ => (
            "Generating comprehensive sales intelligence report",
            "Combining all analysis into actionable insights".to_string(),
            "Final report generated with strategic recommendations.",
        ),
    };
    ProgressEvent {
        idx,
        message: message.to_string(),
        details,
        output: Some(output.to_string()),
        total_steps: TOTAL_STEPS,
    }
}

fn error_event(idx: usize, error: &str) -> ProgressEvent {
    let mut output: String = error.chars().take(ERROR_OUTPUT_CHARS).collect();
    if output.len() < error.len() {
        output.push_str("...");
    }
    ProgressEvent {
        idx,
        message: "Execution Error".to_string(),
        details: format!("Error during analysis: {error}"),
        output: Some(output),
        total_steps: TOTAL_STEPS,
    }
}

/// Everything a background run needs besides the run itself.
#[derive(Clone)]
pub struct Runner {
    hub: ProgressHub,
    delivery: Arc<ReportDelivery>,
    step_delay: Duration,
}

impl Runner {
    #[must_use]
    pub fn new(hub: ProgressHub, delivery: Arc<ReportDelivery>, step_delay: Duration) -> Self {
        Self {
            hub,
            delivery,
            step_delay,
        }
    }

    async fn publish(&self, id: &str, step: ProgressEvent) {
        if let Err(e) = self.hub.publish_step(id, step).await {
            tracing::warn!(submission_id = %id, error = %e, "failed to publish progress step");
        }
    }

    /// Pull snapshots until the run ends, publishing each UI step reached.
    /// `next_idx` tracks the next unpublished step. Returns the report to
    /// deliver, if the run produced one.
    async fn drive(
        &self,
        id: &str,
        run: &mut PipelineRun,
        next_idx: &mut usize,
    ) -> Option<String> {
        let mut report = None;
        while let Some(snapshot) = run.next_snapshot().await {
            if snapshot.aborted {
                let error = snapshot
                    .submission
                    .errors
                    .last()
                    .map_or("unknown failure", String::as_str);
                tracing::error!(submission_id = %id, stage = snapshot.stage, error = %error, "run aborted");
                self.publish(id, error_event((*next_idx).min(TOTAL_STEPS - 1), error))
                    .await;
                return Some(error_report(error));
            }

            if let Some(target) = step_for_stage(snapshot.stage) {
                while *next_idx <= target {
                    if *next_idx > 0 && !self.step_delay.is_zero() {
                        tokio::time::sleep(self.step_delay).await;
                    }
                    self.publish(id, step_event(*next_idx, &snapshot.submission))
                        .await;
                    *next_idx += 1;
                }
            }

            if snapshot.stage == FINALIZE_STAGE {
                report = snapshot
                    .submission
                    .final_report
                    .as_ref()
                    .map(|r| r.report.clone());
            }
        }
        report
    }

    /// Run every stage, publishing progress as UI steps are reached, then
    /// deliver the report and release the submission.
    ///
    /// Every run ends with a published step: the final report step on
    /// completion, or an "Execution Error" step when a fatal stage aborts
    /// or a stage panics.
    pub async fn run_submission(&self, mut run: PipelineRun) {
        let id = run.submission().id.clone();
        let mut next_idx = 0;

        let outcome = AssertUnwindSafe(self.drive(&id, &mut run, &mut next_idx))
            .catch_unwind()
            .await;
        let report = match outcome {
            Ok(report) => report,
            Err(panic) => {
                let error = format!("Stage panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(submission_id = %id, error = %error, "run panicked");
                self.publish(&id, error_event(next_idx.min(TOTAL_STEPS - 1), &error))
                    .await;
                Some(error_report(&error))
            }
        };

        let report = report.unwrap_or_else(|| {
            "# Report Generation Incomplete\n\nThe system couldn't generate a complete report. \
             Please try again."
                .to_string()
        });
        if let Err(e) = self.delivery.deliver(&id, &report).await {
            tracing::error!(submission_id = %id, error = %e, "report delivery failed");
        }
        if let Err(e) = self.hub.finish(&id).await {
            tracing::warn!(submission_id = %id, error = %e, "submission already released");
        }
    }
}

fn error_report(error: &str) -> String {
    format!("# Error in Analysis\n\nAn error occurred during analysis: {error}")
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
