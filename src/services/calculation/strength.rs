use chrono::{DateTime, Utc};

use super::ScoreCalculator;
use crate::models::content::ContentSnapshot;
use crate::models::event::ContentProgressedEvent;
use crate::models::reward::{AllRewardScores, Dimension, RewardScore};

/// Reserved dimension. Both passes leave the score untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct StrengthScoreCalculator;

impl StrengthScoreCalculator {
    pub fn new() -> Self {
        Self
    }
}

impl ScoreCalculator for StrengthScoreCalculator {
    fn dimension(&self) -> Dimension {
        Dimension::Strength
    }

    fn recalculate<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        _contents: &[ContentSnapshot],
        _now: DateTime<Utc>,
    ) -> &'a RewardScore {
        &scores.strength
    }

    fn calculate_on_activity<'a>(
        &self,
        scores: &'a mut AllRewardScores,
        _contents: &[ContentSnapshot],
        _event: &ContentProgressedEvent,
        _now: DateTime<Utc>,
    ) -> &'a RewardScore {
        &scores.strength
    }
}
