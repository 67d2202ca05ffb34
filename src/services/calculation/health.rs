use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{decayed_on_day_of, whole_days_between, ScoreCalculator};
use crate::models::content::ContentSnapshot;
use crate::models::event::ContentProgressedEvent;
use crate::models::reward::{AllRewardScores, Dimension, RewardChangeReason, RewardScore};

/// Multiplier applied to the summed overdue days for the daily health decrease.
pub const HEALTH_MODIFIER_PER_DAY: f64 = 0.5;
/// Largest health decrease of a single daily recalculation.
pub const HEALTH_DECREASE_CAP: f64 = 20.0;
pub const HEALTH_MAX: i32 = 100;
pub const HEALTH_MIN: i32 = 0;

/// Health drops while new content stays due without being worked on and refills
/// when the learner catches up.
#[derive(Debug, Default, Clone, Copy)]
pub struct HealthScoreCalculator;

impl HealthScoreCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Health of an aggregate created right now, so that a course with overdue
    /// content does not start at full health.
    pub fn initial_value(&self, contents: &[ContentSnapshot], now: DateTime<Utc>) -> i32 {
        let due = due_contents_never_worked_on(contents, now);
        let decrease = health_decrease(&due, now);
        (HEALTH_MAX - decrease).clamp(HEALTH_MIN, HEALTH_MAX)
    }
}

impl ScoreCalculator for HealthScoreCalculator {
    fn dimension(&self) -> Dimension {
        Dimension::Health
    }

    fn recalculate<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        now: DateTime<Utc>,
    ) -> &'a RewardScore {
        let health = &mut scores.health;
        let old_value = health.value;

        if decayed_on_day_of(health, now) {
            debug!(target: "app::reward::health", "health already decayed today");
            return health;
        }

        let due = due_contents_never_worked_on(contents, now);
        let decrease = health_decrease(&due, now);
        let new_value = (old_value - decrease).clamp(HEALTH_MIN, HEALTH_MAX);

        if health.apply_change(
            new_value,
            RewardChangeReason::ContentDueForLearning,
            ids(&due),
            now,
        ) {
            debug!(
                target: "app::reward::health",
                old_value,
                new_value,
                due_contents = due.len(),
                "health decreased for overdue content"
            );
        }

        health
    }

    fn calculate_on_activity<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        event: &ContentProgressedEvent,
        now: DateTime<Utc>,
    ) -> &'a RewardScore {
        let health = &mut scores.health;
        let old_value = health.value;
        let diff_to_full = HEALTH_MAX - old_value;

        if diff_to_full <= 0 {
            return health;
        }

        let due = due_contents_never_worked_on(contents, now);
        let mut due_before = due.len() as i32;
        // The snapshot may already reflect the completion; count the completed
        // content anyway so the divisor is never zero.
        if !due.iter().any(|content| content.id == event.content_id) {
            due_before += 1;
        }

        let increase = diff_to_full / due_before;
        let new_value = (old_value + increase).clamp(HEALTH_MIN, HEALTH_MAX);

        if health.apply_change(
            new_value,
            RewardChangeReason::ContentDone,
            vec![event.content_id],
            now,
        ) {
            debug!(
                target: "app::reward::health",
                old_value,
                new_value,
                content_id = %event.content_id,
                "health restored by completed content"
            );
        }

        health
    }
}

fn due_contents_never_worked_on(
    contents: &[ContentSnapshot],
    now: DateTime<Utc>,
) -> Vec<&ContentSnapshot> {
    contents
        .iter()
        .filter(|content| content.user_progress_data.was_never_worked_on())
        .filter(|content| {
            content
                .metadata
                .suggested_date
                .map(|due| due < now)
                .unwrap_or(false)
        })
        .collect()
}

/// Positive decrease: half a point per overdue day, where being due today already
/// counts as one day, floored and capped.
fn health_decrease(due: &[&ContentSnapshot], now: DateTime<Utc>) -> i32 {
    let weighted_days: i64 = due
        .iter()
        .filter_map(|content| content.metadata.suggested_date)
        .map(|due_date| whole_days_between(due_date, now).max(0) + 1)
        .sum();

    (HEALTH_MODIFIER_PER_DAY * weighted_days as f64)
        .floor()
        .min(HEALTH_DECREASE_CAP) as i32
}

fn ids(contents: &[&ContentSnapshot]) -> Vec<Uuid> {
    contents.iter().map(|content| content.id).collect()
}
