use super::*;

fn step(idx: usize) -> ProgressEvent {
    ProgressEvent {
        idx,
        message: format!("step {idx}"),
        details: "details".to_string(),
        output: Some(format!("output {idx}")),
        total_steps: 10,
    }
}

fn hub() -> ProgressHub {
    ProgressHub::new(Duration::from_secs(3600))
}

fn indices(message: &HubMessage) -> Vec<u64> {
    let HubMessage::Snapshot(json) = message else {
        panic!("expected snapshot, got {message:?}");
    };
    let steps: Vec<serde_json::Value> = serde_json::from_str(json).unwrap();
    steps.iter().map(|s| s["idx"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn duplicate_start_is_rejected() {
    let hub = hub();
    hub.start_submission("s1").await.unwrap();
    assert!(matches!(
        hub.start_submission("s1").await,
        Err(HubError::DuplicateSubmission(id)) if id == "s1"
    ));
}

#[tokio::test]
async fn subscribing_to_unknown_submission_fails() {
    let hub = hub();
    assert!(matches!(
        hub.subscribe("missing").await,
        Err(HubError::UnknownSubmission(_))
    ));
}

#[tokio::test]
async fn early_subscriber_gets_empty_history_then_full_snapshots() {
    let hub = hub();
    hub.start_submission("s1").await.unwrap();
    let mut sub = hub.subscribe("s1").await.unwrap();

    assert_eq!(
        sub.receiver.recv().await.unwrap(),
        HubMessage::Snapshot("[]".to_string())
    );

    hub.publish_step("s1", step(0)).await.unwrap();
    hub.publish_step("s1", step(1)).await.unwrap();

    assert_eq!(indices(&sub.receiver.recv().await.unwrap()), [0]);
    let second = sub.receiver.recv().await.unwrap();
    assert_eq!(indices(&second), [0, 1]);

    let HubMessage::Snapshot(json) = second else {
        unreachable!()
    };
    let steps: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(steps[1]["totalSteps"], 10);
    assert_eq!(steps[1]["output"], "output 1");
}

#[tokio::test]
async fn late_subscriber_replays_history_first() {
    let hub = hub();
    hub.start_submission("s1").await.unwrap();
    for idx in 0..3 {
        hub.publish_step("s1", step(idx)).await.unwrap();
    }

    let mut late = hub.subscribe("s1").await.unwrap();
    hub.publish_step("s1", step(3)).await.unwrap();

    assert_eq!(indices(&late.receiver.recv().await.unwrap()), [0, 1, 2]);
    assert_eq!(indices(&late.receiver.recv().await.unwrap()), [0, 1, 2, 3]);
}

#[tokio::test]
async fn decreasing_step_index_is_rejected() {
    let hub = hub();
    hub.start_submission("s1").await.unwrap();
    hub.publish_step("s1", step(4)).await.unwrap();
    hub.publish_step("s1", step(4)).await.unwrap();
    assert!(matches!(
        hub.publish_step("s1", step(3)).await,
        Err(HubError::OutOfOrder { idx: 3, last: 4, .. })
    ));
    assert_eq!(hub.health().await.per_submission_detail["s1"].step_count, 2);
}

#[tokio::test]
async fn disconnected_subscriber_is_dropped_without_affecting_others() {
    let hub = hub();
    hub.start_submission("s1").await.unwrap();
    let gone = hub.subscribe("s1").await.unwrap();
    let mut kept = hub.subscribe("s1").await.unwrap();
    drop(gone);

    hub.publish_step("s1", step(0)).await.unwrap();

    assert_eq!(indices(&kept.receiver.recv().await.unwrap()), Vec::<u64>::new());
    assert_eq!(indices(&kept.receiver.recv().await.unwrap()), [0]);
    assert_eq!(hub.health().await.per_submission_detail["s1"].subscriber_count, 1);
}

#[tokio::test]
async fn unsubscribe_removes_only_that_subscriber() {
    let hub = hub();
    hub.start_submission("s1").await.unwrap();
    let first = hub.subscribe("s1").await.unwrap();
    let _second = hub.subscribe("s1").await.unwrap();

    hub.unsubscribe("s1", first.subscriber_id).await;
    hub.unsubscribe("s1", 9_999).await;
    hub.unsubscribe("other", first.subscriber_id).await;

    assert_eq!(hub.health().await.per_submission_detail["s1"].subscriber_count, 1);
}

#[tokio::test]
async fn finish_closes_subscribers_and_frees_the_id() {
    let hub = hub();
    hub.start_submission("s1").await.unwrap();
    let mut sub = hub.subscribe("s1").await.unwrap();
    hub.publish_step("s1", step(0)).await.unwrap();

    hub.finish("s1").await.unwrap();

    sub.receiver.recv().await.unwrap();
    sub.receiver.recv().await.unwrap();
    assert_eq!(
        sub.receiver.recv().await.unwrap(),
        HubMessage::Close {
            code: CLOSE_NORMAL,
            reason: "Execution completed"
        }
    );
    assert!(sub.receiver.recv().await.is_none());

    assert!(matches!(
        hub.subscribe("s1").await,
        Err(HubError::UnknownSubmission(_))
    ));
    assert!(matches!(hub.finish("s1").await, Err(HubError::UnknownSubmission(_))));
    hub.start_submission("s1").await.unwrap();
}

#[tokio::test]
async fn health_reports_each_submission() {
    let hub = hub();
    hub.start_submission("a").await.unwrap();
    hub.start_submission("b").await.unwrap();
    let _sub = hub.subscribe("a").await.unwrap();
    hub.publish_step("a", step(0)).await.unwrap();

    let health = hub.health().await;
    assert_eq!(health.active_submissions, 2);
    let a = &health.per_submission_detail["a"];
    assert!(a.active);
    assert_eq!(a.subscriber_count, 1);
    assert_eq!(a.step_count, 1);
    assert_eq!(health.per_submission_detail["b"].step_count, 0);

    let json = serde_json::to_value(&health).unwrap();
    assert_eq!(json["activeSubmissions"], 2);
    assert_eq!(json["perSubmissionDetail"]["a"]["subscriberCount"], 1);
    assert!(json["perSubmissionDetail"]["a"]["runtimeSeconds"].is_number());
}

#[tokio::test]
async fn sweep_evicts_only_expired_submissions() {
    let hub = ProgressHub::new(Duration::from_secs(60));
    hub.start_submission("old").await.unwrap();
    let mut sub = hub.subscribe("old").await.unwrap();

    assert!(hub.sweep_expired().await.is_empty());

    let later = Instant::now() + Duration::from_secs(61);
    hub.start_submission("new").await.unwrap();
    let evicted = hub.sweep_expired_at(later).await;
    assert_eq!(evicted, ["new", "old"]);

    sub.receiver.recv().await.unwrap();
    assert_eq!(
        sub.receiver.recv().await.unwrap(),
        HubMessage::Close {
            code: CLOSE_GOING_AWAY,
            reason: "Submission expired"
        }
    );
    assert_eq!(hub.health().await.active_submissions, 0);
}
