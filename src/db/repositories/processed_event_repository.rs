use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{named_params, Connection};
use uuid::Uuid;

use crate::error::AppResult;

/// Natural identity of an activity event: one user finishing one content at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedEventKey {
    pub user_id: Uuid,
    pub content_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl ProcessedEventKey {
    fn occurred_at_text(&self) -> String {
        self.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

pub struct ProcessedEventRepository;

impl ProcessedEventRepository {
    pub fn is_processed(conn: &Connection, key: &ProcessedEventKey) -> AppResult<bool> {
        let count: i64 = conn.query_row(
            r#"
                SELECT COUNT(*) FROM processed_progress_events
                WHERE user_id = :user_id AND content_id = :content_id AND occurred_at = :occurred_at
            "#,
            named_params! {
                ":user_id": key.user_id.to_string(),
                ":content_id": key.content_id.to_string(),
                ":occurred_at": key.occurred_at_text(),
            },
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Records the event. Returns `false` when it was already recorded.
    pub fn mark_processed(
        conn: &Connection,
        key: &ProcessedEventKey,
        course_id: Uuid,
    ) -> AppResult<bool> {
        let inserted = conn.execute(
            r#"
                INSERT OR IGNORE INTO processed_progress_events (
                    user_id, content_id, occurred_at, course_id, processed_at
                ) VALUES (
                    :user_id, :content_id, :occurred_at, :course_id, :processed_at
                )
            "#,
            named_params! {
                ":user_id": key.user_id.to_string(),
                ":content_id": key.content_id.to_string(),
                ":occurred_at": key.occurred_at_text(),
                ":course_id": course_id.to_string(),
                ":processed_at": Utc::now().to_rfc3339(),
            },
        )?;
        Ok(inserted > 0)
    }

    /// Removes bookkeeping older than `before`; returns the number of deleted rows.
    pub fn purge_before(conn: &Connection, before: DateTime<Utc>) -> AppResult<usize> {
        let deleted = conn.execute(
            "DELETE FROM processed_progress_events WHERE processed_at < :before",
            named_params! { ":before": before.to_rfc3339() },
        )?;
        Ok(deleted)
    }
}
