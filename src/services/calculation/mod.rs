//! Per-dimension score calculators.
//!
//! Every calculator owns exactly one dimension of [`AllRewardScores`]. It may read
//! the other dimensions but only ever mutates its own, and it appends a log entry
//! only when the value actually changed.

pub mod fitness;
pub mod growth;
pub mod health;
pub mod power;
pub mod strength;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::models::content::ContentSnapshot;
use crate::models::event::ContentProgressedEvent;
use crate::models::reward::{AllRewardScores, Dimension, RewardChangeReason, RewardScore};

pub use fitness::FitnessScoreCalculator;
pub use growth::GrowthScoreCalculator;
pub use health::HealthScoreCalculator;
pub use power::PowerScoreCalculator;
pub use strength::StrengthScoreCalculator;

pub trait ScoreCalculator: Send + Sync {
    fn dimension(&self) -> Dimension;

    /// Scheduled pass over every content of the course.
    fn recalculate<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        now: DateTime<Utc>,
    ) -> &'a RewardScore;

    /// Pass triggered by one user finishing one content. `contents` is still the
    /// full course so denominators stay meaningful.
    fn calculate_on_activity<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        contents: &[ContentSnapshot],
        event: &ContentProgressedEvent,
        now: DateTime<Utc>,
    ) -> &'a RewardScore;
}

/// The calculators in evaluation order. Power derives from the other four and
/// therefore runs last.
pub fn default_calculators(config: &ScoringConfig) -> Vec<Box<dyn ScoreCalculator>> {
    vec![
        Box::new(HealthScoreCalculator::new()),
        Box::new(FitnessScoreCalculator::new(config.fitness)),
        Box::new(GrowthScoreCalculator::new()),
        Box::new(StrengthScoreCalculator::new()),
        Box::new(PowerScoreCalculator::new(config.power_multiplier)),
    ]
}

/// Whole days elapsed from `earlier` to `later`; negative when `earlier` is in the future.
pub(crate) fn whole_days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    (later - earlier).num_hours().div_euclid(24)
}

/// Whether `score` already took its batch decay on the UTC day of `now`. Decay is
/// applied at most once per day so repeated recalculations stay idempotent.
pub(crate) fn decayed_on_day_of(score: &RewardScore, now: DateTime<Utc>) -> bool {
    score
        .log
        .iter()
        .rev()
        .find(|entry| entry.reason == RewardChangeReason::ContentDueForLearning)
        .map(|entry| entry.date.date_naive() == now.date_naive())
        .unwrap_or(false)
}
