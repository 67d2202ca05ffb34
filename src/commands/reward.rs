use crate::commands::{parse_id, AppState, CommandError, CommandResult};
use crate::models::reward::AllRewardScores;
use crate::services::reward_service::BatchSummary;

/// Stored scores of one user in one course.
pub async fn user_course_reward_scores(
    state: &AppState,
    course_id: String,
    user_id: String,
) -> CommandResult<AllRewardScores> {
    let course_id = parse_id("courseId", &course_id)?;
    let user_id = parse_id("userId", &user_id)?;

    state
        .rewards()
        .get_scores(course_id, user_id)
        .await
        .map_err(CommandError::from)
}

pub async fn course_recalculate_scores_for_user(
    state: &AppState,
    course_id: String,
    user_id: String,
) -> CommandResult<AllRewardScores> {
    let course_id = parse_id("courseId", &course_id)?;
    let user_id = parse_id("userId", &user_id)?;

    state
        .rewards()
        .recalculate_scores(course_id, user_id)
        .await
        .map_err(CommandError::from)
}

pub async fn reward_recalculate_all(state: &AppState) -> CommandResult<BatchSummary> {
    state
        .rewards()
        .recalculate_all()
        .await
        .map_err(CommandError::from)
}
