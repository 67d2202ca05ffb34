use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressLogItem {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default)]
    pub correctness: f64,
    #[serde(default)]
    pub hints_used: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_complete: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProgressData {
    #[serde(default)]
    pub is_learned: bool,
    #[serde(default)]
    pub learning_interval: Option<i32>,
    #[serde(default)]
    pub last_learn_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_learn_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log: Vec<ProgressLogItem>,
}

impl UserProgressData {
    /// Newest entry by timestamp, regardless of the order the collaborator sent.
    pub fn latest_log_item(&self) -> Option<&ProgressLogItem> {
        self.log.iter().max_by_key(|item| item.timestamp)
    }

    pub fn was_never_worked_on(&self) -> bool {
        !self.is_learned && self.log.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub content_type: Option<String>,
    #[serde(default)]
    pub chapter_id: Option<Uuid>,
    #[serde(default)]
    pub suggested_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reward_points: i32,
    #[serde(default)]
    pub tag_names: Vec<String>,
}

/// A content item joined with the requesting user's progress. Fetched fresh for
/// every computation and never written back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentSnapshot {
    pub id: Uuid,
    #[serde(default)]
    pub metadata: ContentMetadata,
    #[serde(default)]
    pub user_progress_data: UserProgressData,
}

/// Fetches content metadata joined with one user's progress.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn contents_with_progress(
        &self,
        user_id: Uuid,
        chapter_ids: &[Uuid],
    ) -> AppResult<Vec<ContentSnapshot>>;
}

/// Resolves courses to chapters and content to its owning course.
#[async_trait]
pub trait CourseProvider: Send + Sync {
    /// Fails with `InvalidScope` when the course does not exist.
    async fn chapter_ids(&self, course_id: Uuid) -> AppResult<Vec<Uuid>>;

    /// Fails with `InvalidScope` when no course offers the content.
    async fn course_id_for_content(&self, content_id: Uuid) -> AppResult<Uuid>;
}
