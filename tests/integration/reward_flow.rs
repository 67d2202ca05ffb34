mod common;

use chrono::{Duration, Utc};
use reward_service_lib::commands::reward::{
    course_recalculate_scores_for_user, reward_recalculate_all, user_course_reward_scores,
};
use reward_service_lib::error::AppError;
use reward_service_lib::models::reward::{Dimension, RewardChangeReason};
use reward_service_lib::services::reward_service::ActivityOutcome;
use uuid::Uuid;

use common::{completed_content, harness, overdue_content, progress_event};

#[tokio::test]
async fn scores_are_not_fabricated_before_first_computation() {
    let h = harness();

    let error = user_course_reward_scores(&h.state, h.course_id.to_string(), h.user_id.to_string())
        .await
        .expect_err("no aggregate yet");

    assert_eq!(error.code, "NOT_FOUND");
}

#[tokio::test]
async fn first_recalculation_seeds_health_from_overdue_content() {
    let h = harness();
    let content = overdue_content(1, 10);
    let content_id = content.id;
    h.contents.set_contents(vec![content]);

    let seeded = course_recalculate_scores_for_user(
        &h.state,
        h.course_id.to_string(),
        h.user_id.to_string(),
    )
    .await
    .expect("first recalculation");

    assert_eq!(seeded.health.value, 99);
    assert!(seeded.health.log.is_empty());
    assert_eq!(seeded.fitness.value, 100);
    assert_eq!(seeded.growth.value, 0);
    assert_eq!(seeded.growth.percentage, Some(0.0));
    assert_eq!(seeded.power.value, 0);
    assert!(seeded.power.log.is_empty());

    let stored = user_course_reward_scores(&h.state, h.course_id.to_string(), h.user_id.to_string())
        .await
        .expect("stored aggregate");
    assert_eq!(stored, seeded);

    let first_pass = h
        .state
        .rewards()
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("second recalculation");

    assert_eq!(first_pass.health.value, 98);
    assert_eq!(first_pass.health.log.len(), 1);
    let entry = &first_pass.health.log[0];
    assert_eq!(entry.difference, -1);
    assert_eq!(entry.reason, RewardChangeReason::ContentDueForLearning);
    assert_eq!(entry.associated_content_ids, vec![content_id]);
}

#[tokio::test]
async fn repeated_recalculation_with_overdue_content_is_idempotent() {
    let h = harness();
    h.contents.set_contents(vec![overdue_content(4, 10)]);
    let service = h.state.rewards();

    service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("seed");
    let decayed = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("daily decay");
    let repeated = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("repeated recalculation");

    // Seeded at 98, decayed once to 96; the repeat on the same day changes nothing.
    assert_eq!(decayed.health.value, 96);
    assert_eq!(repeated, decayed);
    assert_eq!(repeated.health.log.len(), 1);
}

#[tokio::test]
async fn recalculation_without_due_content_writes_no_new_log_entries() {
    let h = harness();
    h.contents
        .set_contents(vec![completed_content(Uuid::new_v4(), Utc::now() - Duration::hours(1), 10)]);
    let service = h.state.rewards();

    let first = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("first recalculation");
    assert_eq!(first.health.value, 100);
    assert_eq!(first.growth.value, 10);
    assert_eq!(first.growth.percentage, Some(1.0));
    assert_eq!(first.power.value, 210);

    let second = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("second recalculation");
    let third = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("third recalculation");

    assert_eq!(second, third);
    for dimension in Dimension::ALL {
        assert_eq!(
            first.get(dimension).log.len(),
            third.get(dimension).log.len(),
            "{dimension} log grew"
        );
    }
}

#[tokio::test]
async fn completed_content_restores_health_and_feeds_growth_and_power() {
    let h = harness();
    let overdue: Vec<_> = (0..5).map(|_| overdue_content(10, 10)).collect();
    let completed_id = overdue[0].id;
    h.contents.set_contents(overdue.clone());
    h.courses.assign(completed_id, h.course_id);
    let service = h.state.rewards();

    let seeded = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("seed");
    assert_eq!(seeded.health.value, 80);

    let now = Utc::now();
    let mut after_completion = overdue;
    after_completion[0] = completed_content(completed_id, now, 10);
    h.contents.set_contents(after_completion);

    let event = progress_event(h.user_id, completed_id, now);
    let outcome = service
        .calculate_scores_on_content_worked_on(&event)
        .await
        .expect("activity");

    let ActivityOutcome::Applied(scores) = outcome else {
        panic!("event should be applied");
    };
    assert_eq!(scores.health.value, 84);
    let entry = &scores.health.log[0];
    assert_eq!(entry.difference, 4);
    assert_eq!(entry.reason, RewardChangeReason::ContentDone);
    assert_eq!(entry.associated_content_ids, vec![completed_id]);

    assert_eq!(scores.fitness.value, 100);
    assert!(scores.fitness.log.is_empty());
    assert_eq!(scores.growth.value, 10);
    assert_eq!(scores.growth.percentage, Some(0.2));
    assert_eq!(scores.power.value, 194);
    assert_eq!(scores.power.log[0].reason, RewardChangeReason::CompositeValue);

    let redelivered = service
        .calculate_scores_on_content_worked_on(&event)
        .await
        .expect("duplicate delivery");
    assert_eq!(redelivered, ActivityOutcome::Duplicate);

    let stored = service
        .get_scores(h.course_id, h.user_id)
        .await
        .expect("stored");
    assert_eq!(stored.health.log.len(), 1);
    assert_eq!(stored.power.log.len(), 1);
}

#[tokio::test]
async fn collaborator_failure_leaves_aggregate_untouched() {
    let h = harness();
    h.contents.set_contents(vec![overdue_content(1, 10)]);
    let service = h.state.rewards();
    let before = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("seed");

    h.contents.fail_with(Some(true));
    let error = service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect_err("content service offline");
    assert!(matches!(error, AppError::CollaboratorUnavailable { retryable: true, .. }));

    let after = service
        .get_scores(h.course_id, h.user_id)
        .await
        .expect("still stored");
    assert_eq!(after, before);
}

#[tokio::test]
async fn batch_run_covers_every_aggregate_and_counts_failures() {
    let h = harness();
    h.contents.set_contents(vec![overdue_content(3, 10)]);
    let service = h.state.rewards();

    let second_user = Uuid::new_v4();
    let retired_course = Uuid::new_v4();
    h.courses.add_course(retired_course);
    for (course_id, user_id) in [
        (h.course_id, h.user_id),
        (h.course_id, second_user),
        (retired_course, h.user_id),
    ] {
        service
            .recalculate_scores(course_id, user_id)
            .await
            .expect("seed aggregate");
    }
    h.courses.remove_course(retired_course);

    let summary = reward_recalculate_all(&h.state).await.expect("batch run");

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retryable_failures, 0);
    assert!(summary.finished_at >= summary.started_at);

    let scores = service
        .get_scores(h.course_id, second_user)
        .await
        .expect("batch updated aggregate");
    // 3 days overdue: 0.5 * (3 + 1) = 2 points per run.
    assert_eq!(scores.health.value, 96);
    assert_eq!(scores.health.log.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_recalculations_of_one_aggregate_are_serialized() {
    let h = harness();
    h.contents.set_contents(vec![overdue_content(10, 10)]);
    let service = h.state.rewards();

    service
        .recalculate_scores(h.course_id, h.user_id)
        .await
        .expect("seed");

    let handles: Vec<_> = (0..9)
        .map(|_| {
            let service = service.clone();
            let (course_id, user_id) = (h.course_id, h.user_id);
            tokio::spawn(async move { service.recalculate_scores(course_id, user_id).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.expect("task joined").expect("recalculation succeeded");
    }

    let scores = service
        .get_scores(h.course_id, h.user_id)
        .await
        .expect("stored");
    // Seeded at 95; only one of the nine runs may take today's decay.
    assert_eq!(scores.health.value, 90);
    assert_eq!(scores.health.log.len(), 1);
    assert_eq!(scores.health.log[0].difference, -5);
}

#[tokio::test]
async fn nightly_job_starts_once() {
    let h = harness();
    let service = h.state.rewards();

    service.ensure_nightly_job().expect("first start");
    service.ensure_nightly_job().expect("second start is a no-op");
}

#[tokio::test]
async fn processed_event_markers_expire_after_retention() {
    let h = harness();
    let now = Utc::now();
    let content_id = Uuid::new_v4();
    h.contents.set_contents(vec![completed_content(content_id, now, 10)]);
    h.courses.assign(content_id, h.course_id);
    let service = h.state.rewards();

    service
        .calculate_scores_on_content_worked_on(&progress_event(h.user_id, content_id, now))
        .await
        .expect("activity applied");

    assert_eq!(service.purge_processed_events(now).await.expect("purge"), 0);
    assert_eq!(
        service
            .purge_processed_events(now + Duration::days(31))
            .await
            .expect("purge"),
        1
    );
}
