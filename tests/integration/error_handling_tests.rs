mod common;

use std::collections::HashMap;

use reward_service_lib::commands::reward::{
    course_recalculate_scores_for_user, user_course_reward_scores,
};
use reward_service_lib::commands::CommandError;
use reward_service_lib::config::EngineConfig;
use reward_service_lib::error::{AppError, Collaborator};
use uuid::Uuid;

use common::{harness, overdue_content};

#[tokio::test]
async fn malformed_ids_are_validation_errors() {
    let h = harness();

    let error = user_course_reward_scores(&h.state, "course-1".to_string(), h.user_id.to_string())
        .await
        .expect_err("invalid course id");

    assert_eq!(error.code, "VALIDATION_ERROR");
    let details = error.details.expect("details");
    assert_eq!(details["field"], "courseId");
}

#[tokio::test]
async fn unknown_course_is_an_invalid_scope() {
    let h = harness();

    let error = course_recalculate_scores_for_user(
        &h.state,
        Uuid::new_v4().to_string(),
        h.user_id.to_string(),
    )
    .await
    .expect_err("unknown course");

    assert_eq!(error.code, "INVALID_SCOPE");
}

#[tokio::test]
async fn unavailable_collaborator_reports_retry_hint() {
    let h = harness();
    h.contents.set_contents(vec![overdue_content(1, 10)]);
    h.contents.fail_with(Some(true));

    let error = course_recalculate_scores_for_user(
        &h.state,
        h.course_id.to_string(),
        h.user_id.to_string(),
    )
    .await
    .expect_err("content service offline");

    assert_eq!(error.code, "COLLABORATOR_UNAVAILABLE");
    let details = error.details.expect("details");
    assert_eq!(details["collaborator"], "content_service");
    assert_eq!(details["retryable"], true);
}

#[test]
fn app_errors_map_to_stable_codes() {
    let cases = vec![
        (AppError::not_found(), "NOT_FOUND"),
        (AppError::conflict("stale log"), "CONFLICT"),
        (AppError::timeout("content-progressed", 50), "TIMEOUT"),
        (
            AppError::collaborator_unavailable(Collaborator::CourseService, "down", false),
            "COLLABORATOR_UNAVAILABLE",
        ),
        (AppError::database("disk I/O error"), "UNKNOWN"),
        (AppError::other("boom"), "UNKNOWN"),
    ];

    for (error, code) in cases {
        assert_eq!(CommandError::from(error).code, code);
    }
}

#[test]
fn invalid_configuration_is_rejected() {
    let env: HashMap<&str, &str> = HashMap::from([("REWARD_NIGHTLY_RUN_HOUR", "25")]);
    let result = EngineConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()));

    assert!(matches!(result, Err(AppError::Validation { .. })));
}
