use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::{decayed_on_day_of, whole_days_between, ScoreCalculator};
use crate::config::FitnessConfig;
use crate::models::content::ContentSnapshot;
use crate::models::event::ContentProgressedEvent;
use crate::models::reward::{AllRewardScores, Dimension, RewardChangeReason, RewardScore};

pub const FITNESS_MAX: i32 = 100;
pub const FITNESS_MIN: i32 = 0;

/// Fitness tracks spaced repetition: it decays while learned content is overdue
/// for repetition and regenerates when content is reviewed.
#[derive(Debug, Clone, Copy)]
pub struct FitnessScoreCalculator {
    config: FitnessConfig,
}

impl Default for FitnessScoreCalculator {
    fn default() -> Self {
        Self::new(FitnessConfig::default())
    }
}

impl FitnessScoreCalculator {
    pub fn new(config: FitnessConfig) -> Self {
        Self { config }
    }

    /// Learned content whose next repetition date has passed.
    fn due_for_repetition<'c>(
        &self,
        contents: &'c [ContentSnapshot],
        now: DateTime<Utc>,
    ) -> Vec<&'c ContentSnapshot> {
        contents
            .iter()
            .filter(|content| {
                let progress = &content.user_progress_data;
                matches!(
                    (progress.last_learn_date, progress.next_learn_date),
                    (Some(last), Some(next)) if last <= now && next <= now
                )
            })
            .collect()
    }

    /// How well the content is still remembered, in `[0, 1]`: the latest correctness
    /// fading linearly with the time since the last repetition, squared so stale
    /// content is penalized super-linearly.
    fn correctness_modifier(&self, content: &ContentSnapshot, now: DateTime<Utc>) -> f64 {
        let progress = &content.user_progress_data;
        let Some(last_learned) = progress.last_learn_date else {
            return 0.0;
        };

        let days_since = ((now - last_learned).num_seconds().max(0) as f64) / 86_400.0;
        let freshness = (1.0 - days_since / self.config.staleness_horizon_days).max(0.0);
        let latest_correctness = progress
            .latest_log_item()
            .map(|item| item.correctness.clamp(0.0, 1.0))
            .unwrap_or(1.0);

        (latest_correctness * freshness).powi(2)
    }

    fn days_overdue(content: &ContentSnapshot, now: DateTime<Utc>) -> i64 {
        content
            .user_progress_data
            .next_learn_date
            .map(|next| whole_days_between(next, now))
            .unwrap_or(0)
            .max(1)
    }

    /// Fraction of the current value lost in one cycle.
    fn decrease_fraction(&self, due: &[&ContentSnapshot], now: DateTime<Utc>) -> f64 {
        let points: f64 = due
            .iter()
            .map(|content| {
                let days_overdue = Self::days_overdue(content, now) as f64;
                let modifier = self.correctness_modifier(content, now);
                1.0 + 2.0 * days_overdue * (1.0 - modifier)
            })
            .sum();

        (points / 100.0).min(self.config.max_decrease_fraction)
    }
}

impl ScoreCalculator for FitnessScoreCalculator {
    fn dimension(&self) -> Dimension {
        Dimension::Fitness
    }

    fn recalculate<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        now: DateTime<Utc>,
    ) -> &'a RewardScore {
        let due = self.due_for_repetition(contents, now);
        let fitness = &mut scores.fitness;

        if due.is_empty() || decayed_on_day_of(fitness, now) {
            return fitness;
        }

        let old_value = fitness.value;
        let fraction = self.decrease_fraction(&due, now);
        let new_value = ((old_value as f64) * (1.0 - fraction))
            .round()
            .clamp(FITNESS_MIN as f64, FITNESS_MAX as f64) as i32;

        let ids: Vec<Uuid> = due.iter().map(|content| content.id).collect();
        if fitness.apply_change(new_value, RewardChangeReason::ContentDueForLearning, ids, now) {
            debug!(
                target: "app::reward::fitness",
                old_value,
                new_value,
                fraction,
                due_contents = due.len(),
                "fitness decayed for overdue repetitions"
            );
        }

        fitness
    }

    fn calculate_on_activity<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        event: &ContentProgressedEvent,
        now: DateTime<Utc>,
    ) -> &'a RewardScore {
        let due = self.due_for_repetition(contents, now);
        let fitness = &mut scores.fitness;
        let old_value = fitness.value;

        let before = if due.is_empty() {
            0.0
        } else {
            due.iter()
                .map(|content| self.correctness_modifier(content, now))
                .sum::<f64>()
                / due.len() as f64
        };
        let after = event.correctness.clamp(0.0, 1.0);

        let mut ids: Vec<Uuid> = due.iter().map(|content| content.id).collect();
        if !ids.contains(&event.content_id) {
            ids.push(event.content_id);
        }
        let items_to_repeat = ids.len() as f64;

        let headroom = (FITNESS_MAX - old_value).max(0) as f64;
        let per_item = ((1.0 + after - before) * headroom / items_to_repeat)
            .min(self.config.max_regeneration_per_item)
            .max(0.0);
        let new_value = (old_value as f64 + per_item * items_to_repeat)
            .round()
            .clamp(FITNESS_MIN as f64, FITNESS_MAX as f64) as i32;

        if fitness.apply_change(new_value, RewardChangeReason::ContentReviewed, ids, now) {
            debug!(
                target: "app::reward::fitness",
                old_value,
                new_value,
                before,
                after,
                "fitness regenerated by review"
            );
        }

        fitness
    }
}
