use chrono::{DateTime, Utc};
use tracing::trace;

use super::ScoreCalculator;
use crate::models::content::ContentSnapshot;
use crate::models::event::ContentProgressedEvent;
use crate::models::reward::{AllRewardScores, Dimension, RewardScore};

/// Growth is the share of the course's reward points the learner has earned.
///
/// `value` counts earned reward points and is therefore not bounded by 100 on
/// courses worth more points; `percentage` is the bounded ratio in `[0, 1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct GrowthScoreCalculator;

impl GrowthScoreCalculator {
    pub fn new() -> Self {
        Self
    }

    fn recompute<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
    ) -> &'a RewardScore {
        let total: i64 = contents
            .iter()
            .map(|content| i64::from(content.metadata.reward_points.max(0)))
            .sum();
        let earned: i64 = contents
            .iter()
            .filter(|content| {
                content
                    .user_progress_data
                    .latest_log_item()
                    .map(|item| item.success)
                    .unwrap_or(false)
            })
            .map(|content| i64::from(content.metadata.reward_points.max(0)))
            .sum();

        let percentage = if total == 0 {
            0.0
        } else {
            earned as f64 / total as f64
        };

        let growth = &mut scores.growth;
        growth.value = i32::try_from(earned).unwrap_or(i32::MAX);
        growth.percentage = Some(percentage);

        trace!(
            target: "app::reward::growth",
            earned,
            total,
            percentage,
            "growth recomputed"
        );

        growth
    }
}

impl ScoreCalculator for GrowthScoreCalculator {
    fn dimension(&self) -> Dimension {
        Dimension::Growth
    }

    fn recalculate<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        _now: DateTime<Utc>,
    ) -> &'a RewardScore {
        self.recompute(scores, contents)
    }

    fn calculate_on_activity<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        _event: &ContentProgressedEvent,
        _now: DateTime<Utc>,
    ) -> &'a RewardScore {
        self.recompute(scores, contents)
    }
}
