use std::time::Duration;

use dealbrief_core::BreakerConfig;
use dealbrief_pipeline::stages::{PROSPECT_NEWS, SELLER_FETCH};
use dealbrief_pipeline::SubmissionInput;
use dealbrief_resilience::Guard;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use super::*;
use crate::hub::{HubMessage, CLOSE_NORMAL};
use crate::test_support::{panicking_engine, scripted_engine};

fn input() -> SubmissionInput {
    SubmissionInput {
        submission_id: "s1".to_string(),
        seller_url: "https://seller.example".to_string(),
        prospect_url: "https://prospect.example".to_string(),
    }
}

async fn storage(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports/s1"))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn runner(hub: &ProgressHub, server: &MockServer) -> Runner {
    let delivery = ReportDelivery::new(
        &format!("{}/reports", server.uri()),
        5,
        Guard::new(BreakerConfig::default()),
    )
    .unwrap();
    Runner::new(hub.clone(), Arc::new(delivery), Duration::ZERO)
}

/// Every message the subscriber saw, with snapshots parsed.
async fn drain(
    mut receiver: tokio::sync::mpsc::UnboundedReceiver<HubMessage>,
) -> (Vec<Vec<serde_json::Value>>, Vec<HubMessage>) {
    let mut snapshots = Vec::new();
    let mut closes = Vec::new();
    while let Some(message) = receiver.recv().await {
        match message {
            HubMessage::Snapshot(json) => snapshots.push(serde_json::from_str(&json).unwrap()),
            close @ HubMessage::Close { .. } => closes.push(close),
        }
    }
    (snapshots, closes)
}

async fn delivered_report(server: &MockServer) -> String {
    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    body["result"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn completed_run_publishes_every_step_then_closes() {
    let hub = ProgressHub::new(Duration::from_secs(3600));
    let server = storage(200).await;
    let engine = scripted_engine(None, None);

    hub.start_submission("s1").await.unwrap();
    let sub = hub.subscribe("s1").await.unwrap();
    runner(&hub, &server)
        .run_submission(engine.run(input()).unwrap())
        .await;

    let (snapshots, closes) = drain(sub.receiver).await;
    assert_eq!(snapshots.len(), TOTAL_STEPS + 1);
    assert!(snapshots[0].is_empty());
    for (n, snapshot) in snapshots.iter().enumerate().skip(1) {
        let idx: Vec<u64> = snapshot.iter().map(|s| s["idx"].as_u64().unwrap()).collect();
        let expected: Vec<u64> = (0..n as u64).collect();
        assert_eq!(idx, expected);
    }

    let last = snapshots.last().unwrap().last().unwrap();
    assert_eq!(last["idx"], 9);
    assert_eq!(last["totalSteps"], 10);
    assert!(!last["output"].as_str().unwrap().is_empty());
    assert_eq!(
        closes,
        [HubMessage::Close {
            code: CLOSE_NORMAL,
            reason: "Execution completed"
        }]
    );

    let report = delivered_report(&server).await;
    assert!(report.contains("report after prospect-macro-trends"));
    assert!(!report.contains("## Execution Errors"));
    assert_eq!(hub.health().await.active_submissions, 0);
}

#[test]
fn step_details_name_the_companies() {
    let mut submission = dealbrief_pipeline::Submission::new(input(), chrono::Utc::now());
    submission.seller_name = "Seller".to_string();
    submission.prospect_name = "Prospect".to_string();

    assert_eq!(
        step_event(1, &submission).details,
        "Extracting key information about Seller"
    );
    assert_eq!(
        step_event(4, &submission).details,
        "Gathering public information about Prospect"
    );
}

#[tokio::test]
async fn fatal_stage_ends_with_an_execution_error_step() {
    let hub = ProgressHub::new(Duration::from_secs(3600));
    let server = storage(200).await;
    let engine = scripted_engine(Some(SELLER_FETCH), None);

    hub.start_submission("s1").await.unwrap();
    let sub = hub.subscribe("s1").await.unwrap();
    runner(&hub, &server)
        .run_submission(engine.run(input()).unwrap())
        .await;

    let (snapshots, closes) = drain(sub.receiver).await;
    let history = snapshots.last().unwrap();
    let indices: Vec<u64> = history.iter().map(|s| s["idx"].as_u64().unwrap()).collect();
    assert_eq!(indices, [0, 1, 2]);

    let error_step = history.last().unwrap();
    assert_eq!(error_step["message"], "Execution Error");
    assert!(error_step["output"]
        .as_str()
        .unwrap()
        .contains("seller-fetch rejected input"));
    assert_eq!(closes.len(), 1);

    assert!(delivered_report(&server).await.starts_with("# Error in Analysis"));
}

#[tokio::test]
async fn panicking_stage_still_ends_with_an_error_step_and_releases() {
    let hub = ProgressHub::new(Duration::from_secs(3600));
    let server = storage(200).await;
    let engine = panicking_engine(SELLER_FETCH);

    hub.start_submission("s1").await.unwrap();
    let sub = hub.subscribe("s1").await.unwrap();
    let runner = runner(&hub, &server);
    let run = engine.run(input()).unwrap();
    tokio::spawn(async move { runner.run_submission(run).await })
        .await
        .expect("runner task should not panic");

    let (snapshots, closes) = drain(sub.receiver).await;
    let history = snapshots.last().unwrap();
    let indices: Vec<u64> = history.iter().map(|s| s["idx"].as_u64().unwrap()).collect();
    assert_eq!(indices, [0, 1, 2]);

    let error_step = history.last().unwrap();
    assert_eq!(error_step["message"], "Execution Error");
    assert!(error_step["output"]
        .as_str()
        .unwrap()
        .contains("Stage panicked: seller-fetch blew up"));
    assert_eq!(
        closes,
        [HubMessage::Close {
            code: CLOSE_NORMAL,
            reason: "Execution completed"
        }]
    );

    assert!(delivered_report(&server).await.starts_with("# Error in Analysis"));
    assert_eq!(hub.health().await.active_submissions, 0);
    hub.start_submission("s1").await.unwrap();
}

#[tokio::test]
async fn non_fatal_failure_still_reaches_the_final_step() {
    let hub = ProgressHub::new(Duration::from_secs(3600));
    let server = storage(200).await;
    let engine = scripted_engine(None, Some(PROSPECT_NEWS));

    hub.start_submission("s1").await.unwrap();
    let sub = hub.subscribe("s1").await.unwrap();
    runner(&hub, &server)
        .run_submission(engine.run(input()).unwrap())
        .await;

    let (snapshots, _) = drain(sub.receiver).await;
    assert_eq!(snapshots.last().unwrap().len(), TOTAL_STEPS);
    assert!(delivered_report(&server)
        .await
        .contains("## Execution Errors\n- Stage prospect-news failed"));
}

#[tokio::test]
async fn failed_delivery_still_releases_the_submission() {
    let hub = ProgressHub::new(Duration::from_secs(3600));
    let server = storage(503).await;
    let engine = scripted_engine(None, None);

    hub.start_submission("s1").await.unwrap();
    runner(&hub, &server)
        .run_submission(engine.run(input()).unwrap())
        .await;

    assert_eq!(hub.health().await.active_submissions, 0);
    hub.start_submission("s1").await.unwrap();
}

#[test]
fn error_output_is_truncated() {
    let long = "x".repeat(2_000);
    let event = error_event(3, &long);
    assert_eq!(event.idx, 3);
    assert_eq!(event.output.unwrap().len(), ERROR_OUTPUT_CHARS + 3);
}
