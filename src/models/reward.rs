use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compound identity of a score aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreKey {
    pub user_id: Uuid,
    pub course_id: Uuid,
}

impl ScoreKey {
    pub fn new(user_id: Uuid, course_id: Uuid) -> Self {
        Self { user_id, course_id }
    }
}

impl fmt::Display for ScoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.course_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Health,
    Fitness,
    Growth,
    Strength,
    Power,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Health,
        Dimension::Fitness,
        Dimension::Growth,
        Dimension::Strength,
        Dimension::Power,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Health => "health",
            Dimension::Fitness => "fitness",
            Dimension::Growth => "growth",
            Dimension::Strength => "strength",
            Dimension::Power => "power",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Dimension {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "health" => Ok(Dimension::Health),
            "fitness" => Ok(Dimension::Fitness),
            "growth" => Ok(Dimension::Growth),
            "strength" => Ok(Dimension::Strength),
            "power" => Ok(Dimension::Power),
            other => Err(format!("unsupported reward dimension: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardChangeReason {
    ContentDueForLearning,
    ContentDone,
    ContentReviewed,
    CompositeValue,
}

impl RewardChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardChangeReason::ContentDueForLearning => "CONTENT_DUE_FOR_LEARNING",
            RewardChangeReason::ContentDone => "CONTENT_DONE",
            RewardChangeReason::ContentReviewed => "CONTENT_REVIEWED",
            RewardChangeReason::CompositeValue => "COMPOSITE_VALUE",
        }
    }
}

impl fmt::Display for RewardChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for RewardChangeReason {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "CONTENT_DUE_FOR_LEARNING" => Ok(RewardChangeReason::ContentDueForLearning),
            "CONTENT_DONE" => Ok(RewardChangeReason::ContentDone),
            "CONTENT_REVIEWED" => Ok(RewardChangeReason::ContentReviewed),
            "COMPOSITE_VALUE" => Ok(RewardChangeReason::CompositeValue),
            other => Err(format!("unsupported reward change reason: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RewardScoreLogEntry {
    pub date: DateTime<Utc>,
    pub old_value: i32,
    pub new_value: i32,
    pub difference: i32,
    pub reason: RewardChangeReason,
    #[serde(default)]
    pub associated_content_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RewardScore {
    pub value: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub log: Vec<RewardScoreLogEntry>,
}

impl RewardScore {
    pub fn new(value: i32) -> Self {
        Self {
            value,
            percentage: None,
            log: Vec::new(),
        }
    }

    /// Sets the value and appends an audit entry. Returns `false` and leaves the
    /// score untouched when the value would not change.
    pub fn apply_change(
        &mut self,
        new_value: i32,
        reason: RewardChangeReason,
        associated_content_ids: Vec<Uuid>,
        date: DateTime<Utc>,
    ) -> bool {
        let old_value = self.value;
        if new_value == old_value {
            return false;
        }

        self.log.push(RewardScoreLogEntry {
            date,
            old_value,
            new_value,
            difference: new_value - old_value,
            reason,
            associated_content_ids,
        });
        self.value = new_value;
        true
    }
}

/// The five reward scores of one learner in one course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllRewardScores {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub health: RewardScore,
    pub fitness: RewardScore,
    pub growth: RewardScore,
    pub strength: RewardScore,
    pub power: RewardScore,
}

impl AllRewardScores {
    pub const INITIAL_FITNESS: i32 = 100;

    /// Fresh aggregate; health is supplied by the caller because it depends on
    /// the course's overdue content.
    pub fn initial(key: ScoreKey, health: i32) -> Self {
        Self {
            user_id: key.user_id,
            course_id: key.course_id,
            health: RewardScore::new(health),
            fitness: RewardScore::new(Self::INITIAL_FITNESS),
            growth: RewardScore {
                value: 0,
                percentage: Some(0.0),
                log: Vec::new(),
            },
            strength: RewardScore::new(0),
            power: RewardScore::new(0),
        }
    }

    pub fn key(&self) -> ScoreKey {
        ScoreKey::new(self.user_id, self.course_id)
    }

    pub fn get(&self, dimension: Dimension) -> &RewardScore {
        match dimension {
            Dimension::Health => &self.health,
            Dimension::Fitness => &self.fitness,
            Dimension::Growth => &self.growth,
            Dimension::Strength => &self.strength,
            Dimension::Power => &self.power,
        }
    }

    pub fn get_mut(&mut self, dimension: Dimension) -> &mut RewardScore {
        match dimension {
            Dimension::Health => &mut self.health,
            Dimension::Fitness => &mut self.fitness,
            Dimension::Growth => &mut self.growth,
            Dimension::Strength => &mut self.strength,
            Dimension::Power => &mut self.power,
        }
    }
}
