use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, Collaborator};
use crate::models::content::{ContentProvider, ContentSnapshot};
use crate::services::graphql_client::GraphQlClient;

const CONTENTS_WITH_PROGRESS_QUERY: &str = r#"
query($userId: UUID!, $chapterIds: [UUID!]!) {
    contentsByChapterIds(chapterIds: $chapterIds) {
        id
        metadata {
            name
            tagNames
            suggestedDate
            type
            chapterId
            rewardPoints
        }
        userProgressData(userId: $userId) {
            isLearned
            learningInterval
            nextLearnDate
            lastLearnDate
            log {
                timestamp
                success
                correctness
                hintsUsed
                timeToComplete
            }
        }
    }
}
"#;

/// Content service adapter: contents of a set of chapters joined with one user's progress.
#[derive(Debug, Clone)]
pub struct ContentServiceClient {
    graphql: GraphQlClient,
}

impl ContentServiceClient {
    pub fn new(endpoint: &str, timeout: StdDuration) -> AppResult<Self> {
        Ok(Self {
            graphql: GraphQlClient::try_new(Collaborator::ContentService, endpoint, timeout)?,
        })
    }
}

#[async_trait]
impl ContentProvider for ContentServiceClient {
    async fn contents_with_progress(
        &self,
        user_id: Uuid,
        chapter_ids: &[Uuid],
    ) -> AppResult<Vec<ContentSnapshot>> {
        if chapter_ids.is_empty() {
            return Ok(Vec::new());
        }

        let data = self
            .graphql
            .query(
                CONTENTS_WITH_PROGRESS_QUERY,
                json!({ "userId": user_id, "chapterIds": chapter_ids }),
            )
            .await?;

        let contents = decode_contents(&data)?;
        debug!(
            target: "app::collaborator",
            user_id = %user_id,
            chapters = chapter_ids.len(),
            contents = contents.len(),
            "contents with progress fetched"
        );
        Ok(contents)
    }
}

/// The service answers one list per chapter. Entries that do not decode are skipped.
fn decode_contents(data: &JsonValue) -> AppResult<Vec<ContentSnapshot>> {
    let chapters = data
        .get("contentsByChapterIds")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| {
            AppError::collaborator_unavailable(
                Collaborator::ContentService,
                "响应缺少 contentsByChapterIds 字段",
                false,
            )
        })?;

    let mut contents = Vec::new();
    for chapter in chapters {
        let Some(items) = chapter.as_array() else {
            warn!(target: "app::collaborator", "skipping malformed chapter entry");
            continue;
        };
        for item in items {
            match serde_json::from_value::<ContentSnapshot>(item.clone()) {
                Ok(content) => contents.push(content),
                Err(err) => warn!(
                    target: "app::collaborator",
                    error = %err,
                    id = ?item.get("id"),
                    "skipping malformed content"
                ),
            }
        }
    }
    Ok(contents)
}
