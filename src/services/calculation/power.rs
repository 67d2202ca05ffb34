use chrono::{DateTime, Utc};
use tracing::debug;

use super::ScoreCalculator;
use crate::models::content::ContentSnapshot;
use crate::models::event::ContentProgressedEvent;
use crate::models::reward::{AllRewardScores, Dimension, RewardChangeReason, RewardScore};

/// Composite of the other four dimensions; must run after them.
#[derive(Debug, Clone, Copy)]
pub struct PowerScoreCalculator {
    multiplier: f64,
}

impl PowerScoreCalculator {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    pub fn composite_value(&self, scores: &AllRewardScores) -> i32 {
        let base = f64::from(scores.growth.value) + f64::from(scores.strength.value);
        let boost = f64::from(scores.health.value) + f64::from(scores.fitness.value);
        (base + self.multiplier * boost * base).round() as i32
    }

    fn recompute<'a>(&self, scores: &'a mut AllRewardScores, now: DateTime<Utc>) -> &'a RewardScore {
        let new_value = self.composite_value(scores);
        let power = &mut scores.power;
        let old_value = power.value;

        if power.apply_change(new_value, RewardChangeReason::CompositeValue, Vec::new(), now) {
            debug!(target: "app::reward::power", old_value, new_value, "power recomputed");
        }

        power
    }
}

impl ScoreCalculator for PowerScoreCalculator {
    fn dimension(&self) -> Dimension {
        Dimension::Power
    }

    fn recalculate<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        _contents: &[ContentSnapshot],
        now: DateTime<Utc>,
    ) -> &'a RewardScore {
        self.recompute(scores, now)
    }

    fn calculate_on_activity<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        _contents: &[ContentSnapshot],
        _event: &ContentProgressedEvent,
        now: DateTime<Utc>,
    ) -> &'a RewardScore {
        self.recompute(scores, now)
    }
}
