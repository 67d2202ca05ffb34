use std::time::Duration as StdDuration;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, Collaborator};
use crate::models::content::CourseProvider;
use crate::services::graphql_client::GraphQlClient;

const CHAPTER_IDS_QUERY: &str = r#"
query($courseId: UUID!) {
    coursesById(ids: [$courseId]) {
        chapters {
            elements {
                id
            }
        }
    }
}
"#;

const COURSE_FOR_CONTENT_QUERY: &str = r#"
query($contentId: UUID!) {
    resourceById(ids: [$contentId]) {
        availableCourses
    }
}
"#;

/// Course service adapter.
#[derive(Debug, Clone)]
pub struct CourseServiceClient {
    graphql: GraphQlClient,
}

impl CourseServiceClient {
    pub fn new(endpoint: &str, timeout: StdDuration) -> AppResult<Self> {
        Ok(Self {
            graphql: GraphQlClient::try_new(Collaborator::CourseService, endpoint, timeout)?,
        })
    }
}

#[async_trait]
impl CourseProvider for CourseServiceClient {
    async fn chapter_ids(&self, course_id: Uuid) -> AppResult<Vec<Uuid>> {
        let data = self
            .graphql
            .query(CHAPTER_IDS_QUERY, json!({ "courseId": course_id }))
            .await?;

        let course = data
            .pointer("/coursesById/0")
            .filter(|course| !course.is_null())
            .ok_or_else(|| AppError::invalid_scope(format!("课程不存在: {course_id}")))?;

        let chapter_ids: Vec<Uuid> = course
            .pointer("/chapters/elements")
            .and_then(JsonValue::as_array)
            .map(|elements| {
                elements
                    .iter()
                    .filter_map(|element| {
                        let id = element
                            .get("id")
                            .and_then(JsonValue::as_str)
                            .and_then(|raw| Uuid::parse_str(raw).ok());
                        if id.is_none() {
                            warn!(target: "app::collaborator", %course_id, "skipping malformed chapter");
                        }
                        id
                    })
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            target: "app::collaborator",
            %course_id,
            chapters = chapter_ids.len(),
            "chapter ids resolved"
        );
        Ok(chapter_ids)
    }

    async fn course_id_for_content(&self, content_id: Uuid) -> AppResult<Uuid> {
        let data = self
            .graphql
            .query(COURSE_FOR_CONTENT_QUERY, json!({ "contentId": content_id }))
            .await?;

        data.pointer("/resourceById/0/availableCourses/0")
            .and_then(JsonValue::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| AppError::invalid_scope(format!("内容不属于任何课程: {content_id}")))
    }
}
