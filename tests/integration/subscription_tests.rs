mod common;

use std::time::Duration as StdDuration;

use chrono::Utc;
use reward_service_lib::commands::subscription::{on_content_progressed, SubscriptionStatus};
use reward_service_lib::config::EngineConfig;
use uuid::Uuid;

use common::{
    cloud_event_body, completed_content, harness, harness_with, overdue_content, progress_event,
};

#[tokio::test]
async fn progressed_event_updates_scores_once() {
    let h = harness();
    let now = Utc::now();
    let content_id = Uuid::new_v4();
    h.contents.set_contents(vec![
        completed_content(content_id, now, 10),
        overdue_content(2, 10),
    ]);
    h.courses.assign(content_id, h.course_id);
    let body = cloud_event_body(&progress_event(h.user_id, content_id, now));

    let first = on_content_progressed(&h.state, &body).await;
    assert_eq!(first.status, SubscriptionStatus::Success);

    let scores = h
        .state
        .rewards()
        .get_scores(h.course_id, h.user_id)
        .await
        .expect("scores stored");
    assert_eq!(scores.growth.value, 10);
    let calls_after_first = h.contents.calls();

    let redelivered = on_content_progressed(&h.state, &body).await;
    assert_eq!(redelivered.status, SubscriptionStatus::Success);
    assert_eq!(h.contents.calls(), calls_after_first);

    let unchanged = h
        .state
        .rewards()
        .get_scores(h.course_id, h.user_id)
        .await
        .expect("scores stored");
    assert_eq!(unchanged, scores);
}

#[tokio::test]
async fn undecodable_bodies_are_dropped() {
    let h = harness();

    let garbage = on_content_progressed(&h.state, b"not json").await;
    assert_eq!(garbage.status, SubscriptionStatus::Drop);

    let without_data =
        on_content_progressed(&h.state, br#"{"id":"1","topic":"content-progressed"}"#).await;
    assert_eq!(without_data.status, SubscriptionStatus::Drop);

    let wrong_shape = on_content_progressed(
        &h.state,
        br#"{"data":{"userId":"nope","contentId":"nope"}}"#,
    )
    .await;
    assert_eq!(wrong_shape.status, SubscriptionStatus::Drop);
    assert_eq!(h.contents.calls(), 0);
}

#[tokio::test]
async fn content_outside_any_course_is_dropped() {
    let h = harness();
    let body = cloud_event_body(&progress_event(h.user_id, Uuid::new_v4(), Utc::now()));

    let ack = on_content_progressed(&h.state, &body).await;

    assert_eq!(ack.status, SubscriptionStatus::Drop);
}

#[tokio::test]
async fn transient_collaborator_failure_asks_for_redelivery() {
    let h = harness();
    let content_id = Uuid::new_v4();
    h.courses.assign(content_id, h.course_id);
    h.contents.fail_with(Some(true));
    let body = cloud_event_body(&progress_event(h.user_id, content_id, Utc::now()));

    let ack = on_content_progressed(&h.state, &body).await;
    assert_eq!(ack.status, SubscriptionStatus::Retry);

    let missing = h.state.rewards().get_scores(h.course_id, h.user_id).await;
    assert!(missing.is_err());

    h.contents.fail_with(None);
    h.contents
        .set_contents(vec![completed_content(content_id, Utc::now(), 5)]);
    let retried = on_content_progressed(&h.state, &body).await;
    assert_eq!(retried.status, SubscriptionStatus::Success);
}

#[tokio::test]
async fn permanent_collaborator_failure_is_dropped() {
    let h = harness();
    let content_id = Uuid::new_v4();
    h.courses.assign(content_id, h.course_id);
    h.contents.fail_with(Some(false));
    let body = cloud_event_body(&progress_event(h.user_id, content_id, Utc::now()));

    let ack = on_content_progressed(&h.state, &body).await;

    assert_eq!(ack.status, SubscriptionStatus::Drop);
}

#[tokio::test]
async fn slow_processing_times_out_as_retry() {
    let h = harness_with(EngineConfig {
        activity_timeout: StdDuration::from_millis(50),
        ..EngineConfig::default()
    });
    let content_id = Uuid::new_v4();
    h.courses.assign(content_id, h.course_id);
    h.contents.delay_by(Some(StdDuration::from_millis(500)));
    let body = cloud_event_body(&progress_event(h.user_id, content_id, Utc::now()));

    let ack = on_content_progressed(&h.state, &body).await;

    assert_eq!(ack.status, SubscriptionStatus::Retry);
    let missing = h.state.rewards().get_scores(h.course_id, h.user_id).await;
    assert!(missing.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timed_out_write_keeps_aggregate_locked_until_it_commits() {
    let h = harness_with(EngineConfig {
        activity_timeout: StdDuration::from_millis(200),
        ..EngineConfig::default()
    });
    let now = Utc::now();
    let completed = Uuid::new_v4();
    h.contents.set_contents(vec![
        overdue_content(10, 10),
        completed_content(completed, now, 10),
    ]);
    h.courses.assign(completed, h.course_id);
    let service = h.state.rewards();

    let seeded = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("seed");
    assert_eq!(seeded.health.value, 95);

    // Another writer holds the database so the activity write stalls past its timeout.
    let blocker = h.state.db().get_connection().expect("blocking connection");
    blocker.execute_batch("BEGIN IMMEDIATE").expect("take write lock");

    let body = cloud_event_body(&progress_event(h.user_id, completed, now));
    let ack = on_content_progressed(&h.state, &body).await;
    assert_eq!(ack.status, SubscriptionStatus::Retry);

    let recalculation = {
        let service = service.clone();
        let (course_id, user_id) = (h.course_id, h.user_id);
        tokio::spawn(async move { service.recalculate_scores(course_id, user_id).await })
    };
    tokio::time::sleep(StdDuration::from_millis(200)).await;
    blocker.execute_batch("ROLLBACK").expect("release write lock");

    recalculation
        .await
        .expect("task joined")
        .expect("recalculation succeeded");

    let scores = service
        .get_scores(h.course_id, h.user_id)
        .await
        .expect("stored");
    // 95 + 5 / 2 from the completion, then today's decay of five points.
    assert_eq!(scores.health.value, 92);
    let diffs: Vec<i32> = scores.health.log.iter().map(|entry| entry.difference).collect();
    assert_eq!(diffs, vec![2, -5]);

    for dimension in [&scores.health, &scores.power] {
        let mut value = dimension.log.first().map(|entry| entry.old_value);
        for entry in &dimension.log {
            assert_eq!(Some(entry.old_value), value);
            value = Some(entry.new_value);
        }
        assert_eq!(value, Some(dimension.value));
    }
}
