use std::collections::HashMap;
use std::convert::TryFrom;

use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, OptionalExtension, Row};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::reward::{
    AllRewardScores, Dimension, RewardChangeReason, RewardScore, RewardScoreLogEntry, ScoreKey,
};

#[derive(Debug, Clone)]
pub struct RewardScoreRow {
    pub user_id: String,
    pub course_id: String,
    pub health: i32,
    pub fitness: i32,
    pub growth: i32,
    pub growth_percentage: Option<f64>,
    pub strength: i32,
    pub power: i32,
}

impl TryFrom<&Row<'_>> for RewardScoreRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            course_id: row.get("course_id")?,
            health: row.get("health")?,
            fitness: row.get("fitness")?,
            growth: row.get("growth")?,
            growth_percentage: row.get("growth_percentage")?,
            strength: row.get("strength")?,
            power: row.get("power")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RewardLogRow {
    pub dimension: String,
    pub date: String,
    pub old_value: i32,
    pub new_value: i32,
    pub difference: i32,
    pub reason: String,
    pub associated_content_ids: String,
}

impl TryFrom<&Row<'_>> for RewardLogRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            dimension: row.get("dimension")?,
            date: row.get("date")?,
            old_value: row.get("old_value")?,
            new_value: row.get("new_value")?,
            difference: row.get("difference")?,
            reason: row.get("reason")?,
            associated_content_ids: row.get("associated_content_ids")?,
        })
    }
}

impl RewardLogRow {
    fn dimension(&self) -> AppResult<Dimension> {
        Dimension::try_from(self.dimension.as_str()).map_err(AppError::database)
    }

    fn into_entry(self) -> AppResult<RewardScoreLogEntry> {
        let date = DateTime::parse_from_rfc3339(&self.date)
            .map_err(|err| AppError::database(format!("invalid log date {}: {err}", self.date)))?
            .with_timezone(&Utc);
        let reason =
            RewardChangeReason::try_from(self.reason.as_str()).map_err(AppError::database)?;
        let associated_content_ids: Vec<Uuid> =
            serde_json::from_str(&self.associated_content_ids)?;

        Ok(RewardScoreLogEntry {
            date,
            old_value: self.old_value,
            new_value: self.new_value,
            difference: self.difference,
            reason,
            associated_content_ids,
        })
    }
}

pub struct RewardScoreRepository;

impl RewardScoreRepository {
    pub fn find(conn: &Connection, key: ScoreKey) -> AppResult<Option<AllRewardScores>> {
        let row = conn
            .query_row(
                r#"
                    SELECT user_id, course_id, health, fitness, growth, growth_percentage, strength, power
                    FROM reward_scores
                    WHERE user_id = :user_id AND course_id = :course_id
                "#,
                named_params! {
                    ":user_id": key.user_id.to_string(),
                    ":course_id": key.course_id.to_string(),
                },
                |row| RewardScoreRow::try_from(row),
            )
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut scores = AllRewardScores {
            user_id: key.user_id,
            course_id: key.course_id,
            health: RewardScore::new(row.health),
            fitness: RewardScore::new(row.fitness),
            growth: RewardScore {
                value: row.growth,
                percentage: row.growth_percentage,
                log: Vec::new(),
            },
            strength: RewardScore::new(row.strength),
            power: RewardScore::new(row.power),
        };

        for log_row in Self::load_log(conn, key)? {
            let dimension = log_row.dimension()?;
            scores.get_mut(dimension).log.push(log_row.into_entry()?);
        }

        Ok(Some(scores))
    }

    fn load_log(conn: &Connection, key: ScoreKey) -> AppResult<Vec<RewardLogRow>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT dimension, date, old_value, new_value, difference, reason, associated_content_ids
                FROM reward_score_log
                WHERE user_id = :user_id AND course_id = :course_id
                ORDER BY dimension, position
            "#,
        )?;

        let rows = stmt.query_map(
            named_params! {
                ":user_id": key.user_id.to_string(),
                ":course_id": key.course_id.to_string(),
            },
            |row| RewardLogRow::try_from(row),
        )?;

        let mut log = Vec::new();
        for row in rows {
            log.push(row?);
        }
        Ok(log)
    }

    pub fn list_keys(conn: &Connection) -> AppResult<Vec<ScoreKey>> {
        let mut stmt = conn.prepare(
            "SELECT user_id, course_id FROM reward_scores ORDER BY course_id, user_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut keys = Vec::new();
        for row in rows {
            let (user_id, course_id) = row?;
            keys.push(ScoreKey::new(parse_uuid(&user_id)?, parse_uuid(&course_id)?));
        }
        Ok(keys)
    }

    /// Upserts the aggregate row and appends the log entries not yet stored.
    /// Stored entries are never rewritten; an in-memory log shorter than the stored
    /// one means the aggregate was loaded before a concurrent write and is rejected.
    /// Returns the number of appended entries.
    pub fn save(conn: &Connection, scores: &AllRewardScores) -> AppResult<usize> {
        let key = scores.key();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
                INSERT INTO reward_scores (
                    user_id, course_id, health, fitness, growth, growth_percentage,
                    strength, power, created_at, updated_at
                ) VALUES (
                    :user_id, :course_id, :health, :fitness, :growth, :growth_percentage,
                    :strength, :power, :now, :now
                )
                ON CONFLICT(user_id, course_id) DO UPDATE SET
                    health = excluded.health,
                    fitness = excluded.fitness,
                    growth = excluded.growth,
                    growth_percentage = excluded.growth_percentage,
                    strength = excluded.strength,
                    power = excluded.power,
                    updated_at = excluded.updated_at
            "#,
            named_params! {
                ":user_id": key.user_id.to_string(),
                ":course_id": key.course_id.to_string(),
                ":health": scores.health.value,
                ":fitness": scores.fitness.value,
                ":growth": scores.growth.value,
                ":growth_percentage": scores.growth.percentage,
                ":strength": scores.strength.value,
                ":power": scores.power.value,
                ":now": &now,
            },
        )?;

        let stored = Self::stored_log_lengths(conn, key)?;
        let mut appended = 0;

        for dimension in Dimension::ALL {
            let log = &scores.get(dimension).log;
            let already_stored = stored.get(&dimension).copied().unwrap_or(0);
            if already_stored > log.len() {
                return Err(AppError::conflict(format!(
                    "{dimension} log of {key} has {already_stored} stored entries but only {} in memory",
                    log.len()
                )));
            }

            for (position, entry) in log.iter().enumerate().skip(already_stored) {
                Self::insert_log_entry(conn, key, dimension, position, entry)?;
                appended += 1;
            }
        }

        debug!(target: "app::db", key = %key, appended, "reward scores saved");
        Ok(appended)
    }

    fn stored_log_lengths(conn: &Connection, key: ScoreKey) -> AppResult<HashMap<Dimension, usize>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT dimension, COUNT(*)
                FROM reward_score_log
                WHERE user_id = :user_id AND course_id = :course_id
                GROUP BY dimension
            "#,
        )?;
        let rows = stmt.query_map(
            named_params! {
                ":user_id": key.user_id.to_string(),
                ":course_id": key.course_id.to_string(),
            },
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut lengths = HashMap::new();
        for row in rows {
            let (dimension, count) = row?;
            let dimension = Dimension::try_from(dimension.as_str()).map_err(AppError::database)?;
            lengths.insert(dimension, usize::try_from(count).unwrap_or(0));
        }
        Ok(lengths)
    }

    fn insert_log_entry(
        conn: &Connection,
        key: ScoreKey,
        dimension: Dimension,
        position: usize,
        entry: &RewardScoreLogEntry,
    ) -> AppResult<()> {
        let associated_content_ids = serde_json::to_string(&entry.associated_content_ids)?;
        conn.execute(
            r#"
                INSERT INTO reward_score_log (
                    user_id, course_id, dimension, position, date,
                    old_value, new_value, difference, reason, associated_content_ids
                ) VALUES (
                    :user_id, :course_id, :dimension, :position, :date,
                    :old_value, :new_value, :difference, :reason, :associated_content_ids
                )
            "#,
            named_params! {
                ":user_id": key.user_id.to_string(),
                ":course_id": key.course_id.to_string(),
                ":dimension": dimension.as_str(),
                ":position": position as i64,
                ":date": entry.date.to_rfc3339(),
                ":old_value": entry.old_value,
                ":new_value": entry.new_value,
                ":difference": entry.difference,
                ":reason": entry.reason.as_str(),
                ":associated_content_ids": &associated_content_ids,
            },
        )?;
        Ok(())
    }

    pub fn delete(conn: &Connection, key: ScoreKey) -> AppResult<bool> {
        let affected = conn.execute(
            "DELETE FROM reward_scores WHERE user_id = :user_id AND course_id = :course_id",
            named_params! {
                ":user_id": key.user_id.to_string(),
                ":course_id": key.course_id.to_string(),
            },
        )?;
        Ok(affected > 0)
    }
}

fn parse_uuid(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| AppError::database(format!("invalid uuid {raw}: {err}")))
}
