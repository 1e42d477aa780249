use async_trait::async_trait;
use futures::StreamExt;

use super::*;
use crate::error::StageError;
use crate::fakes::{context, context_with, FakeContent};
use crate::stages::{self, default_stage_table};
use crate::state::{BranchDelta, SectionKind, SubmissionDelta};

fn input() -> SubmissionInput {
    SubmissionInput {
        submission_id: "s1".to_string(),
        seller_url: "https://seller.example".to_string(),
        prospect_url: "https://prospect.example".to_string(),
    }
}

/// Writes a section named after itself, or fails when told to.
struct Step {
    name: &'static str,
    fail: bool,
    fatal: bool,
}

impl Step {
    fn ok(name: &'static str) -> Self {
        Self { name, fail: false, fatal: false }
    }

    fn failing(name: &'static str) -> Self {
        Self { name, fail: true, fatal: false }
    }

    fn fatal(name: &'static str) -> Self {
        Self { name, fail: true, fatal: true }
    }
}

#[async_trait]
impl Stage for Step {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_fatal(&self) -> bool {
        self.fatal
    }

    async fn execute(
        &self,
        _ctx: &StageContext,
        submission: &Submission,
    ) -> Result<SubmissionDelta, StageError> {
        if self.fail {
            return Err(StageError::Missing(format!("{} input", self.name)));
        }
        let seen = submission.messages.len();
        Ok(SubmissionDelta::for_branch(
            dealbrief_core::BranchKind::Seller,
            BranchDelta {
                report: Some(format!("{} after {seen}", self.name)),
                ..BranchDelta::default()
            },
        ))
    }
}

fn engine(stages: Vec<Step>) -> PipelineEngine {
    let mut table = StageTable::new();
    let mut previous: Option<&'static str> = None;
    for stage in stages {
        let name = stage.name;
        let after: Vec<&'static str> = previous.into_iter().collect();
        table.register(stage, &after).unwrap();
        previous = Some(name);
    }
    PipelineEngine::new(&table, context()).unwrap()
}

async fn drain(run: PipelineRun) -> Vec<StageSnapshot> {
    run.into_stream().collect().await
}

#[tokio::test]
async fn snapshots_follow_stage_order_then_finalize() {
    let engine = engine(vec![Step::ok("a"), Step::ok("b"), Step::ok("c")]);
    let snapshots = drain(engine.run(input()).unwrap()).await;

    let names: Vec<&str> = snapshots.iter().map(|s| s.stage).collect();
    assert_eq!(names, ["a", "b", "c", FINALIZE_STAGE]);
    assert_eq!(snapshots[1].submission.seller.report.as_deref(), Some("b after 1"));

    let last = &snapshots[3].submission;
    let report = last.final_report.as_ref().unwrap();
    assert!(!report.metadata.has_errors);
    assert!(report.report.contains("c after 2"));
    assert_eq!(last.messages.len(), 4);
    assert!(last.messages.iter().all(|m| m.status == StageStatus::Done));
}

#[tokio::test]
async fn failed_stage_is_recorded_and_run_continues_from_prior_state() {
    let engine = engine(vec![Step::ok("a"), Step::failing("b"), Step::ok("c")]);
    let snapshots = drain(engine.run(input()).unwrap()).await;

    assert_eq!(snapshots.len(), 4);
    let failed = &snapshots[1];
    assert_eq!(failed.status, StageStatus::Error);
    assert!(!failed.aborted);
    assert_eq!(failed.submission.seller.report.as_deref(), Some("a after 0"));
    assert_eq!(
        failed.submission.errors,
        ["Stage b failed: missing upstream data: b input"]
    );
    let message = failed.submission.messages.last().unwrap();
    assert_eq!(message.stage, "b");
    assert_eq!(message.error.as_deref(), Some("missing upstream data: b input"));

    assert_eq!(snapshots[2].submission.seller.report.as_deref(), Some("c after 2"));
    let report = snapshots[3].submission.final_report.as_ref().unwrap();
    assert!(report.metadata.has_errors);
    assert!(report.report.contains("## Execution Errors\n- Stage b failed"));
}

#[tokio::test]
async fn fatal_stage_aborts_without_finalizing() {
    let engine = engine(vec![Step::fatal("init"), Step::ok("a")]);
    let mut run = engine.run(input()).unwrap();

    let first = run.next_snapshot().await.unwrap();
    assert!(first.aborted);
    assert_eq!(first.status, StageStatus::Error);
    assert!(first.submission.final_report.is_none());
    assert!(run.next_snapshot().await.is_none());
    assert!(run.next_snapshot().await.is_none());
}

#[tokio::test]
async fn blank_input_is_rejected_before_any_stage() {
    let engine = engine(vec![Step::ok("a")]);
    let mut bad = input();
    bad.seller_url = String::new();
    assert!(matches!(
        engine.run(bad),
        Err(PipelineError::InvalidInput(msg)) if msg.contains("seller_url")
    ));
}

#[tokio::test]
async fn runs_are_independent() {
    let engine = engine(vec![Step::ok("a")]);
    let first = drain(engine.run(input()).unwrap()).await;
    let second = drain(engine.run(input()).unwrap()).await;
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert_eq!(second[0].submission.messages.len(), 1);
}

#[tokio::test]
async fn full_chain_produces_both_reports() {
    let engine = PipelineEngine::new(&default_stage_table().unwrap(), context()).unwrap();
    let snapshots = drain(engine.run(input()).unwrap()).await;

    let errors = &snapshots.last().unwrap().submission.errors;
    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    assert_eq!(snapshots.len(), engine.stage_names().len() + 1);

    let done = &snapshots.last().unwrap().submission;
    assert_eq!(done.seller_name, "Seller");
    assert_eq!(done.prospect_name, "Prospect");
    assert_eq!(done.prospect.discovered_pages.len(), 3);
    assert_eq!(done.prospect.news.len(), 2);
    assert_eq!(done.prospect.jobs.len(), 1);
    assert!(!done.prospect.macro_trends.is_empty());
    assert_eq!(done.sections.len(), SectionKind::ALL.len());

    let seller = done.seller.report.as_deref().unwrap();
    assert!(!seller.contains("```"));
    assert!(seller.contains("They sell analytics [1]("));
    assert!(seller.contains("Customers grow [2]("));

    let prospect = done.prospect.report.as_deref().unwrap();
    assert!(prospect.starts_with("# Prospect Intelligence Report"));
    assert!(prospect.contains("## Citations"));

    let final_report = done.final_report.as_ref().unwrap();
    assert!(final_report.report.contains(seller));
    assert!(final_report.report.contains(prospect));
}

#[tokio::test]
async fn failing_search_only_fails_search_stages() {
    let ctx = context_with(FakeContent {
        fail_search: true,
        ..FakeContent::default()
    });
    let engine = PipelineEngine::new(&default_stage_table().unwrap(), ctx).unwrap();
    let snapshots = drain(engine.run(input()).unwrap()).await;

    let failed: Vec<&str> = snapshots
        .iter()
        .filter(|s| s.status == StageStatus::Error)
        .map(|s| s.stage)
        .collect();
    assert_eq!(failed, [stages::PROSPECT_NEWS]);

    let done = &snapshots.last().unwrap().submission;
    assert!(done.prospect.macro_trends.is_empty());
    assert!(done.final_report.as_ref().unwrap().metadata.has_errors);
}

#[tokio::test]
async fn invalid_url_aborts_the_default_chain() {
    let engine = PipelineEngine::new(&default_stage_table().unwrap(), context()).unwrap();
    let mut bad = input();
    bad.prospect_url = "not a url".to_string();
    let snapshots = drain(engine.run(bad).unwrap()).await;

    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].stage, stages::INITIALIZE);
    assert!(snapshots[0].aborted);
}
